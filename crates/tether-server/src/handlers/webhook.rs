//! Callback URL controllers

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::json_body;
use crate::auth::AuthenticatedTenant;
use crate::error::ApiError;
use crate::response::Envelope;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SetWebhookRequest {
    #[serde(rename = "WebhookURL")]
    pub webhook_url: String,
}

/// `GET /webhook`
pub async fn get_webhook(AuthenticatedTenant(tenant): AuthenticatedTenant) -> Envelope {
    Envelope::ok(json!({
        "webhook": tenant.webhook_url,
        "subscribe": tenant.subscriptions.categories(),
    }))
}

/// `POST /webhook`
pub async fn set_webhook(
    State(state): State<Arc<AppState>>,
    AuthenticatedTenant(tenant): AuthenticatedTenant,
    body: Result<Json<SetWebhookRequest>, JsonRejection>,
) -> Result<Envelope, ApiError> {
    let request = json_body(body)?;
    state
        .supervisor
        .set_callback(tenant.id, &request.webhook_url)
        .await?;
    Ok(Envelope::ok(json!({ "webhook": request.webhook_url })))
}
