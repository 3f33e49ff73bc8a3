//! HTTP control surface
//!
//! Exposes the scrape manager over three endpoints:
//! - `GET /stats` - running flags, last start times and cursors
//! - `POST /start` - launch a job (`{"type", "start", "end", "overwrite"}`)
//! - `POST /stop` - cancel a job (`{"type"}`)

mod handlers;

pub use handlers::JobRequest;

use crate::manager::ScrapeManager;
use crate::{HarvestError, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Builds the control router around a shared manager
pub fn router(manager: Arc<ScrapeManager>) -> Router {
    Router::new()
        .route("/stats", get(handlers::stats_handler))
        .route("/start", post(handlers::start_handler))
        .route("/stop", post(handlers::stop_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(manager)
}

/// Serves the control surface until `shutdown` resolves
///
/// # Arguments
///
/// * `addr` - Address to bind
/// * `manager` - The manager the endpoints drive
/// * `shutdown` - Resolves when the server should stop accepting requests
///
/// # Returns
///
/// * `Ok(())` - The server shut down gracefully
/// * `Err(HarvestError)` - Binding or serving failed
pub async fn serve<F>(addr: SocketAddr, manager: Arc<ScrapeManager>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Control server listening on {}", addr);

    axum::serve(listener, router(manager))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| HarvestError::Server(e.to_string()))
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Received shutdown signal");
}
