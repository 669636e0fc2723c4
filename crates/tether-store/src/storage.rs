//! # Storage Traits
//!
//! The tenant record store is a row-level key-value store. Updates touch a
//! single column of a single tenant and need no cross-tenant transactions.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{TenantId, TenantPatch, TenantRecord};

/// Durable tenant record storage
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Create a tenant; fails if the id or token is taken
    async fn insert(&self, record: &TenantRecord) -> StoreResult<()>;

    async fn load(&self, id: TenantId) -> StoreResult<Option<TenantRecord>>;

    async fn find_by_token(&self, token: &str) -> StoreResult<Option<TenantRecord>>;

    /// Tenants whose connected flag is set
    async fn list_connected(&self) -> StoreResult<Vec<TenantRecord>>;

    /// Apply a single-column update to one tenant
    async fn apply(&self, id: TenantId, patch: TenantPatch) -> StoreResult<()>;

    async fn set_webhook(&self, id: TenantId, url: &str) -> StoreResult<()> {
        self.apply(id, TenantPatch::Webhook(url.to_string())).await
    }

    async fn set_events(&self, id: TenantId, events: &str) -> StoreResult<()> {
        self.apply(id, TenantPatch::Events(events.to_string())).await
    }

    async fn set_identity(&self, id: TenantId, identity: Option<&str>) -> StoreResult<()> {
        self.apply(id, TenantPatch::Identity(identity.map(str::to_string)))
            .await
    }

    async fn set_connected(&self, id: TenantId, connected: bool) -> StoreResult<()> {
        self.apply(id, TenantPatch::Connected(connected)).await
    }

    async fn set_pairing_code(&self, id: TenantId, code: Option<&str>) -> StoreResult<()> {
        self.apply(id, TenantPatch::PairingCode(code.map(str::to_string)))
            .await
    }

    async fn pairing_code(&self, id: TenantId) -> StoreResult<Option<String>> {
        Ok(self.load(id).await?.and_then(|record| record.pairing_code))
    }
}
