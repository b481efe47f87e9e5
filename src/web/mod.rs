mod routes;
pub mod signature;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::processor::EntryProcessor;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<EntryProcessor>,
    pub config: Arc<Config>,
}

/// Build the application router.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve HTTP until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the address is invalid or the server fails.
pub async fn serve(state: AppState, shutdown: CancellationToken) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.web_host, state.config.web_port)
        .parse()
        .context("Invalid web server address")?;

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind web server")?;

    info!(addr = %addr, "Starting HTTP web server");
    info!("Webhook endpoint: POST http://{addr}/webhook");
    info!("Health endpoint:  GET  http://{addr}/health");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Web server error")?;

    Ok(())
}
