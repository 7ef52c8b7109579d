//! Web server and API endpoints for the dashboard.
//!
//! This module exposes the sampler's presenter boundary over REST endpoints
//! and a WebSocket push channel, and serves the single-page dashboard.

pub mod config;
pub mod handlers;
pub mod router;
pub mod websocket;

// Re-export commonly used items
pub use config::WebConfig;
pub use handlers::BuildInfo;
pub use router::{create_app, AppState};

use crate::error::{Result, SystemError};
use crate::metrics::MetricsPresenter;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Start the web server and run until `shutdown` is cancelled.
pub async fn start_web_server(
    config: WebConfig,
    presenter: Arc<dyn MetricsPresenter>,
    shutdown: CancellationToken,
) -> Result<()> {
    config.validate()?;
    let app = create_app(config.clone(), presenter)?;

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| SystemError::web_server_error(format!("Failed to bind to address: {}", e)))?;
    let addr = listener.local_addr()?;

    info!("Starting sysdash web server on http://{}", addr);
    info!("Dashboard available at http://{}/", addr);
    info!("API endpoint: http://{}/api/snapshot", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| SystemError::web_server_error(format!("Server error: {}", e)))?;

    info!("Web server stopped");
    Ok(())
}
