//! HTTP server: route table and listener

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::{
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::json;
use tether_config::{ConfigManager, ServerConfig};
use tether_gateway::SessionConnector;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{ServerError, ServerResult};
use crate::handlers::{session, webhook};
use crate::logging::init_logging;
use crate::state::AppState;

/// Load the config file, install logging, wire the application and resume
/// the sessions stored as connected. Resumed sessions connect in the
/// background.
pub async fn bootstrap(
    config_path: &Path,
    connector: Arc<dyn SessionConnector>,
) -> ServerResult<AppState> {
    let manager = ConfigManager::load(config_path).await?;
    let config = manager.snapshot().await;

    if let Err(e) = init_logging(&config.logging) {
        tracing::warn!("Keeping existing logger: {}", e);
    }

    let state = AppState::build(config, connector).await?;
    state.resume().await?;
    Ok(state)
}

/// Full process startup from a config file, then serve until the listener fails
pub async fn run_server_with_config(
    config_path: &Path,
    connector: Arc<dyn SessionConnector>,
) -> ServerResult<()> {
    let state = bootstrap(config_path, connector).await?;
    let server = state.config.server.clone();
    run_server(state, &server).await
}

/// Serve the API until the listener fails
pub async fn run_server(state: AppState, config: &ServerConfig) -> ServerResult<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| ServerError::InvalidAddress(format!("{}:{} ({})", config.host, config.port, e)))?;

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Tether server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health_handler))
        // session lifecycle
        .route("/session/connect", post(session::connect))
        .route("/session/disconnect", post(session::disconnect))
        .route("/session/logout", post(session::logout))
        .route("/session/status", get(session::status))
        .route("/session/qr", get(session::pairing_code))
        // callback
        .route("/webhook", get(webhook::get_webhook).post(webhook::set_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}
