use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::server::handlers::AppState;

/// Render the Prometheus recorder
pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    let Some(manager) = state.metrics.as_ref() else {
        tracing::debug!("Metrics requested but no recorder is installed");
        return (StatusCode::SERVICE_UNAVAILABLE, "Metrics not available").into_response();
    };

    let content = manager.render();
    tracing::debug!(metrics_size = content.len(), "Metrics served");

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        content,
    )
        .into_response()
}
