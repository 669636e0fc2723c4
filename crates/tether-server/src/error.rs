//! Server error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tether_config::ConfigError;
use tether_gateway::{DeliveryError, SessionError};
use tether_store::StoreError;
use thiserror::Error;

use crate::response::Envelope;

/// Failures while assembling or running the server
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("webhook client error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("logging error: {0}")]
    Logging(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Error answered to an API caller
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Session(err) => session_status(err),
            ApiError::Store(StoreError::TenantNotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn session_status(err: &SessionError) -> StatusCode {
    match err {
        SessionError::AlreadyRunning(_) | SessionError::AlreadyLoggedIn(_) => StatusCode::CONFLICT,
        SessionError::NoSession(_)
        | SessionError::NotAvailable(_)
        | SessionError::TenantNotFound(_) => StatusCode::NOT_FOUND,
        SessionError::NotConnected(_) | SessionError::NotLoggedIn(_) => StatusCode::BAD_REQUEST,
        SessionError::FailedToConnect(_) => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::LogoutFailed { .. } | SessionError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        Envelope::error(status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_store::TenantId;

    #[test]
    fn test_lifecycle_errors_map_to_statuses() {
        let tenant = TenantId(1);
        let cases = [
            (SessionError::AlreadyRunning(tenant), StatusCode::CONFLICT),
            (SessionError::NoSession(tenant), StatusCode::NOT_FOUND),
            (SessionError::NotConnected(tenant), StatusCode::BAD_REQUEST),
            (SessionError::NotLoggedIn(tenant), StatusCode::BAD_REQUEST),
            (SessionError::AlreadyLoggedIn(tenant), StatusCode::CONFLICT),
            (SessionError::FailedToConnect(tenant), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_unauthorized_status() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }
}
