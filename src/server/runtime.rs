use anyhow::Result;
use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::handlers::{self, AppState};
use super::middleware::request_id_middleware;
use crate::config::AppConfig;
use crate::observability::metrics_endpoint;

/// Start the HTTP server and serve until SIGINT/SIGTERM.
///
/// Open connections get `server.shutdown_timeout` seconds to drain after the
/// signal; whatever is still running then is dropped.
pub async fn start_server(config: &AppConfig, state: AppState) -> Result<()> {
    let app = create_router(state);

    let bind_addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {}: {}. Is another process using this port?",
            bind_addr,
            e
        )
    })?;
    info!("Server listening on {}", bind_addr);

    let (signalled_tx, signalled_rx) = watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled_tx.send(true);
        })
        .into_future();
    let timeout = Duration::from_secs(config.server.shutdown_timeout);

    tokio::select! {
        result = server => result?,
        _ = drain_deadline(signalled_rx, timeout) => {
            warn!(
                timeout_secs = config.server.shutdown_timeout,
                "Graceful shutdown timed out, dropping open connections"
            );
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Routing table for the administration API, the session boundary and the
/// navigation/guard endpoints
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/pages", get(handlers::list_pages))
        .route("/pages/{name}/enabled", put(handlers::set_page_enabled))
        .route("/roles", get(handlers::list_roles).post(handlers::create_role))
        .route(
            "/roles/{id}",
            get(handlers::get_role)
                .patch(handlers::update_role)
                .delete(handlers::delete_role),
        )
        .route("/permissions", get(handlers::list_permissions))
        .route("/permissions/{role}", get(handlers::get_permissions))
        .route("/permissions/{role}/{page}", put(handlers::set_permission))
        .route("/admin/reconcile", post(handlers::reconcile))
        .route(
            "/session",
            get(handlers::get_session)
                .post(handlers::sign_in)
                .delete(handlers::sign_out),
        )
        .route("/session/refresh", post(handlers::refresh_session))
        .route("/session/navigation", get(handlers::navigation))
        .route("/session/guard/{page}", get(handlers::guard));

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(metrics_endpoint))
        .nest("/api", api)
        .with_state(state)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Completes `timeout` after the shutdown signal has been observed
async fn drain_deadline(mut signalled: watch::Receiver<bool>, timeout: Duration) {
    if signalled.wait_for(|signalled| *signalled).await.is_err() {
        // Sender gone without a signal: the server finished on its own
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(timeout).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
