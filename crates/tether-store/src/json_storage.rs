//! # JSON File Tenant Store
//!
//! All tenant rows live in one JSON array on disk. Rows are served from an
//! in-memory copy; every mutation rewrites the file through a temporary
//! sibling and a rename.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::memory_storage::check_unique;
use crate::storage::TenantStore;
use crate::types::{TenantId, TenantPatch, TenantRecord};

pub struct JsonTenantStore {
    path: PathBuf,
    records: RwLock<HashMap<TenantId, TenantRecord>>,
    /// Serialises file writes
    write_lock: Mutex<()>,
}

impl JsonTenantStore {
    /// Open the store at `path` (a leading `~` is expanded), creating an
    /// empty file when none exists
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let path = PathBuf::from(shellexpand::tilde(&path_str).as_ref());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let records = if path.exists() {
            let content = fs::read_to_string(&path).await?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                let rows: Vec<TenantRecord> = serde_json::from_str(&content)?;
                rows.into_iter().map(|r| (r.id, r)).collect()
            }
        } else {
            fs::write(&path, "[]").await?;
            HashMap::new()
        };

        info!("JsonTenantStore loaded {} tenants from {:?}", records.len(), path);

        Ok(Self {
            path,
            records: RwLock::new(records),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        let content = {
            let records = self.records.read();
            let mut rows: Vec<&TenantRecord> = records.values().collect();
            rows.sort_by_key(|r| r.id);
            serde_json::to_string_pretty(&rows)?
        };

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!("Persisted tenant store to {:?}", self.path);
        Ok(())
    }
}

#[async_trait]
impl TenantStore for JsonTenantStore {
    async fn insert(&self, record: &TenantRecord) -> StoreResult<()> {
        {
            let mut records = self.records.write();
            check_unique(&records, record)?;
            records.insert(record.id, record.clone());
        }
        self.persist().await
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
        {
            let mut records = self.records.write();
            let record = records
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found(id))?;
            record.apply(patch);
        }
        self.persist().await
    }
}
