//! Prometheus recorder installed once at startup

use anyhow::{Result, anyhow};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Arc, OnceLock};

/// Handle to the installed Prometheus recorder
pub struct MetricsManager {
    handle: PrometheusHandle,
    environment: String,
}

impl MetricsManager {
    /// Install the global Prometheus recorder
    pub fn install(environment: &str) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .add_global_label("service", env!("CARGO_PKG_NAME"))
            .add_global_label("environment", environment)
            .add_global_label("version", env!("CARGO_PKG_VERSION"))
            .install_recorder()
            .map_err(|e| anyhow!("Failed to install Prometheus recorder: {}", e))?;

        tracing::info!(environment = %environment, "Prometheus metrics recorder initialized");

        Ok(Self {
            handle,
            environment: environment.to_string(),
        })
    }

    /// Wrap a handle without touching the global recorder
    pub fn from_handle(handle: PrometheusHandle, environment: &str) -> Self {
        Self {
            handle,
            environment: environment.to_string(),
        }
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }
}

static METRICS_MANAGER: OnceLock<Arc<MetricsManager>> = OnceLock::new();

/// Install the global recorder, or return the one already installed
pub fn init_metrics(environment: &str) -> Result<Arc<MetricsManager>> {
    if let Some(manager) = METRICS_MANAGER.get() {
        return Ok(manager.clone());
    }

    let manager = Arc::new(MetricsManager::install(environment)?);
    Ok(METRICS_MANAGER.get_or_init(|| manager).clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_manager_renders() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let manager = MetricsManager::from_handle(recorder.handle(), "test");

        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("access_admin_writes_total", "operation" => "create_role").increment(1);
        });

        assert_eq!(manager.environment(), "test");
        assert!(manager.render().contains("access_admin_writes_total"));
    }
}
