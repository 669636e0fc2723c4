//! # Tether Store
//!
//! Tenant record storage and the tenant info cache.
//!
//! - [`TenantStore`]: row-level persistence for tenant credentials and settings
//! - [`JsonTenantStore`]: single JSON file implementation
//! - [`MemoryTenantStore`]: in-process implementation
//! - [`TenantInfoCache`]: read-through, write-through cache used on the hot path

pub mod cache;
pub mod error;
pub mod json_storage;
pub mod memory_storage;
pub mod storage;
pub mod types;

pub use cache::TenantInfoCache;
pub use error::{StoreError, StoreResult};
pub use json_storage::JsonTenantStore;
pub use memory_storage::MemoryTenantStore;
pub use storage::TenantStore;
pub use types::{
    EventCategory, Subscriptions, TenantId, TenantInfo, TenantPatch, TenantRecord, UnknownCategory,
};
