//! In-memory tenant store for tests and embedding

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{StoreError, StoreResult};
use crate::storage::TenantStore;
use crate::types::{TenantId, TenantPatch, TenantRecord};

#[derive(Default)]
pub struct MemoryTenantStore {
    records: RwLock<HashMap<TenantId, TenantRecord>>,
}

impl MemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from records, later duplicates overwriting earlier ones
    pub fn with_records(records: impl IntoIterator<Item = TenantRecord>) -> Self {
        let records = records.into_iter().map(|r| (r.id, r)).collect();
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

pub(crate) fn check_unique(
    records: &HashMap<TenantId, TenantRecord>,
    record: &TenantRecord,
) -> StoreResult<()> {
    if records.contains_key(&record.id) {
        return Err(StoreError::TenantAlreadyExists { id: record.id });
    }
    if let Some(existing) = records.values().find(|r| r.token == record.token) {
        return Err(StoreError::DuplicateToken { id: existing.id });
    }
    Ok(())
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn insert(&self, record: &TenantRecord) -> StoreResult<()> {
        let mut records = self.records.write();
        check_unique(&records, record)?;
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, id: TenantId) -> StoreResult<Option<TenantRecord>> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn find_by_token(&self, token: &str) -> StoreResult<Option<TenantRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .find(|r| r.token == token)
            .cloned())
    }

    async fn list_connected(&self) -> StoreResult<Vec<TenantRecord>> {
        let mut connected: Vec<TenantRecord> = self
            .records
            .read()
            .values()
            .filter(|r| r.connected)
            .cloned()
            .collect();
        connected.sort_by_key(|r| r.id);
        Ok(connected)
    }

    async fn apply(&self, id: TenantId, patch: TenantPatch) -> StoreResult<()> {
        let mut records = self.records.write();
        let record = records.get_mut(&id).ok_or(StoreError::not_found(id))?;
        record.apply(patch);
        Ok(())
    }
}
