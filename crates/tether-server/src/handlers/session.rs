//! Session lifecycle controllers

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::json_body;
use crate::auth::AuthenticatedTenant;
use crate::error::ApiError;
use crate::response::Envelope;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectRequest {
    #[serde(rename = "Subscribe", default)]
    pub subscribe: Vec<String>,
    #[serde(rename = "Immediate", default)]
    pub immediate: bool,
}

/// `POST /session/connect`
pub async fn connect(
    State(state): State<Arc<AppState>>,
    AuthenticatedTenant(tenant): AuthenticatedTenant,
    body: Result<Json<ConnectRequest>, JsonRejection>,
) -> Result<Envelope, ApiError> {
    let request = json_body(body)?;
    let subscriptions = state
        .supervisor
        .start_session(tenant.id, &request.subscribe, request.immediate)
        .await?;
    let events = subscriptions.to_stored();
    info!(tenant = %tenant.id, events = %events, immediate = request.immediate, "Session start requested");

    Ok(Envelope::ok(json!({
        "webhook": tenant.webhook_url,
        "jid": tenant.identity,
        "events": events,
        "details": "Connected!",
    })))
}

/// `POST /session/disconnect`
pub async fn disconnect(
    State(state): State<Arc<AppState>>,
    AuthenticatedTenant(tenant): AuthenticatedTenant,
) -> Result<Envelope, ApiError> {
    state.supervisor.stop(tenant.id).await?;
    info!(tenant = %tenant.id, "Session stop requested");
    Ok(Envelope::ok(json!({ "Details": "Disconnected" })))
}

/// `POST /session/logout`
pub async fn logout(
    State(state): State<Arc<AppState>>,
    AuthenticatedTenant(tenant): AuthenticatedTenant,
) -> Result<Envelope, ApiError> {
    state.supervisor.logout(tenant.id).await?;
    info!(tenant = %tenant.id, "Session logged out");
    Ok(Envelope::ok(json!({ "Details": "Logged out" })))
}

/// `GET /session/status`
pub async fn status(
    State(state): State<Arc<AppState>>,
    AuthenticatedTenant(tenant): AuthenticatedTenant,
) -> Result<Envelope, ApiError> {
    let status = state.supervisor.status(tenant.id)?;
    Ok(Envelope::ok(json!({
        "Connected": status.connected,
        "LoggedIn": status.paired,
    })))
}

/// `GET /session/qr`
pub async fn pairing_code(
    State(state): State<Arc<AppState>>,
    AuthenticatedTenant(tenant): AuthenticatedTenant,
) -> Result<Envelope, ApiError> {
    let code = state.supervisor.pairing_artifact(tenant.id).await?;
    Ok(Envelope::ok(json!({ "QRCode": code })))
}
