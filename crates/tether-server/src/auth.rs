//! Tenant token authentication
//!
//! The token comes from the `token` header, or from the `token` query
//! parameter when the header is absent, and is resolved through the
//! Tenant Info Cache.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;
use tether_store::TenantInfo;

use crate::error::ApiError;
use crate::state::AppState;

pub const TOKEN_HEADER: &str = "token";

/// Tenant resolved from the request token
#[derive(Debug, Clone)]
pub struct AuthenticatedTenant(pub TenantInfo);

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Extract the raw token, header first
pub fn request_token(parts: &Parts) -> Option<String> {
    let header = parts
        .headers
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string);
    if header.is_some() {
        return header;
    }

    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(query)| query.token)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthenticatedTenant {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = request_token(parts).ok_or(ApiError::Unauthorized)?;
        match state.cache().get(&token).await? {
            Some(info) => Ok(Self(info)),
            None => {
                tracing::warn!(path = %parts.uri.path(), "Rejected unknown token");
                Err(ApiError::Unauthorized)
            }
        }
    }
}
