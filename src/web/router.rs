//! Web application router and middleware setup.

use crate::error::Result;
use crate::metrics::MetricsPresenter;
use crate::web::config::WebConfig;
use crate::web::handlers;
use crate::web::websocket::{self, ClientRegistry};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub presenter: Arc<dyn MetricsPresenter>,
    pub clients: ClientRegistry,
    pub config: Arc<WebConfig>,
}

impl AppState {
    pub fn new(config: WebConfig, presenter: Arc<dyn MetricsPresenter>) -> Self {
        Self {
            presenter,
            clients: ClientRegistry::default(),
            config: Arc::new(config),
        }
    }
}

/// Create the main axum application with all routes and middleware.
pub fn create_app(config: WebConfig, presenter: Arc<dyn MetricsPresenter>) -> Result<Router> {
    let state = AppState::new(config.clone(), presenter);

    let mut app = Router::new()
        // API routes
        .route("/api/snapshot", get(handlers::get_snapshot))
        .route("/api/history", get(handlers::get_history))
        .route("/api/refresh", post(handlers::refresh))
        .route("/api/health", get(handlers::health_check))
        // WebSocket route
        .route("/ws", get(websocket::websocket_handler));

    if let Some(dir) = config.served_dashboard_dir() {
        info!("Serving static files from: {:?}", dir);
        app = app.nest_service("/static", ServeDir::new(dir));
    } else if let Some(dir) = &config.dashboard_dir {
        warn!("Dashboard directory {:?} does not exist, serving default index", dir);
    }

    app = if config.dashboard_index().is_some() {
        app.route("/", get(handlers::serve_index))
    } else {
        app.route("/", get(handlers::default_index))
    };

    // Add CORS if enabled
    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app = app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    Ok(app.with_state(state))
}
