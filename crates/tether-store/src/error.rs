//! # Store Error Types

use thiserror::Error;

use crate::types::TenantId;

/// Tenant store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tenant not found: {id}")]
    TenantNotFound { id: TenantId },

    #[error("Tenant already exists: {id}")]
    TenantAlreadyExists { id: TenantId },

    /// Two tenants may not share a token
    #[error("Token already in use by tenant {id}")]
    DuplicateToken { id: TenantId },

    #[error("Storage error: {message}")]
    Other { message: String },
}

impl StoreError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    pub fn not_found(id: TenantId) -> Self {
        Self::TenantNotFound { id }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
