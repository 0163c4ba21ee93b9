//! HTTP server setup and request routing for the intake surface.
//!
//! Routes:
//! - `POST /webhooks` creates a queue row for delivery
//! - `GET /health` is the liveness probe with dependency status
//! - `GET /metrics` serves Prometheus text exposition

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    routing::{get, post},
    Router,
};
use conveyor_core::storage::Storage;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::{config::Config, handlers, AppState};

/// Creates the Axum router with all routes and middleware.
pub fn create_router(storage: Arc<Storage>, config: &Config) -> Router {
    let state = AppState::new(storage);

    Router::new()
        .route("/webhooks", post(handlers::create_webhook))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .layer(TimeoutLayer::new(Duration::from_secs(config.server_read_timeout)))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the intake server with graceful shutdown support.
///
/// Serves requests until SIGINT/SIGTERM, then stops accepting connections
/// and drains in-flight requests.
///
/// # Errors
///
/// Returns `std::io::Error` if the port is already in use or the network
/// interface is unavailable.
pub async fn start_server(
    storage: Arc<Storage>,
    config: &Config,
    addr: SocketAddr,
) -> Result<(), std::io::Error> {
    let app = create_router(storage, config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("intake server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("intake server stopped gracefully");
    Ok(())
}

/// Waits for CTRL+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received CTRL+C, shutting down intake server"),
        () = terminate => info!("received SIGTERM, shutting down intake server"),
    }
}
