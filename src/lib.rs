pub mod access;
pub mod config;
pub mod error;
pub mod logging;
pub mod observability;
pub mod server;
pub mod services;

pub use config::*;
pub use error::*;
pub use server::*;

use anyhow::Result;
use std::panic;

use crate::access::AccessControl;

/// Main server entry point for library usage
pub async fn run_server() -> Result<()> {
    let app_config = config::load_config()?;
    run_server_with(app_config).await
}

/// Run the service with an already loaded configuration
pub async fn run_server_with(app_config: AppConfig) -> Result<()> {
    logging::setup_tracing(&app_config.logging)?;

    // Set up panic handler (so it can use logging)
    panic::set_hook(Box::new(|panic_info| {
        ::tracing::error!(?panic_info, "FATAL: Panic occurred");
        std::process::exit(1);
    }));

    ::tracing::info!(
        environment = app_config.environment.as_str(),
        "Staff access service starting up"
    );

    let metrics = match observability::init_metrics(app_config.environment.as_str()) {
        Ok(manager) => Some(manager),
        Err(e) => {
            ::tracing::warn!(error = %e, "Metrics disabled");
            None
        }
    };

    let access = AccessControl::from_config(&app_config.store).await?;
    let report = access.bootstrap(&app_config.access).await?;
    ::tracing::info!(
        pages_inserted = report.pages_inserted,
        duplicate_pages_removed = report.duplicate_pages_removed,
        seeded_admin_role = ?report.seeded_admin_role,
        "Access control bootstrapped"
    );

    let mut state = AppState::new(access);
    if let Some(manager) = metrics {
        state = state.with_metrics(manager);
    }

    server::start_server(&app_config, state).await
}
