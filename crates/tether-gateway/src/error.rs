//! Gateway error types

use tether_store::{StoreError, TenantId};
use thiserror::Error;

/// Lifecycle operation failures, returned to the API caller
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session already running for tenant {0}")]
    AlreadyRunning(TenantId),

    #[error("no session for tenant {0}")]
    NoSession(TenantId),

    #[error("session for tenant {0} is not connected")]
    NotConnected(TenantId),

    #[error("session for tenant {0} is not logged in")]
    NotLoggedIn(TenantId),

    #[error("session for tenant {0} is already logged in")]
    AlreadyLoggedIn(TenantId),

    #[error("no pairing code available for tenant {0}")]
    NotAvailable(TenantId),

    #[error("failed to connect session for tenant {0}")]
    FailedToConnect(TenantId),

    #[error("logout failed for tenant {tenant}: {message}")]
    LogoutFailed { tenant: TenantId, message: String },

    #[error("tenant {0} not found")]
    TenantNotFound(TenantId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Errors reported by the underlying protocol session
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("not connected")]
    NotConnected,

    #[error("pairing unavailable: {0}")]
    Pairing(String),

    #[error("logout failed: {0}")]
    Logout(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("protocol error: {0}")]
    Other(String),
}

/// Webhook delivery failures; only ever logged
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint {url} answered {status}")]
    Status { url: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("delivery queue is full")]
    QueueFull,

    #[error("delivery queue is closed")]
    Closed,
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;
