//! # Tenant Info Cache
//!
//! Read-through, write-through cache in front of a [`TenantStore`]. Entries
//! never expire; every mutation of a cached column must go through here so
//! the cache cannot drift from the store.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::StoreResult;
use crate::storage::TenantStore;
use crate::types::{Subscriptions, TenantId, TenantInfo, TenantRecord};

pub struct TenantInfoCache {
    store: Arc<dyn TenantStore>,
    by_token: DashMap<String, TenantInfo>,
    tokens: DashMap<TenantId, String>,
}

impl TenantInfoCache {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self {
            store,
            by_token: DashMap::new(),
            tokens: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.store
    }

    /// Look up by API token, filling from the store on a miss
    pub async fn get(&self, token: &str) -> StoreResult<Option<TenantInfo>> {
        if let Some(info) = self.by_token.get(token) {
            return Ok(Some(info.value().clone()));
        }

        debug!("Tenant cache miss for token");
        let record = self.store.find_by_token(token).await?;
        Ok(record.map(|record| self.warm(&record)))
    }

    /// Look up by tenant id, filling from the store on a miss
    pub async fn get_by_id(&self, id: TenantId) -> StoreResult<Option<TenantInfo>> {
        if let Some(info) = self.peek_by_id(id) {
            return Ok(Some(info));
        }

        debug!(tenant = %id, "Tenant cache miss");
        let record = self.store.load(id).await?;
        Ok(record.map(|record| self.warm(&record)))
    }

    /// Cached entry only, never touching the store
    pub fn peek_by_id(&self, id: TenantId) -> Option<TenantInfo> {
        let token = self.tokens.get(&id)?.value().clone();
        self.by_token.get(&token).map(|info| info.value().clone())
    }

    /// Populate the cache from a store row
    pub fn warm(&self, record: &TenantRecord) -> TenantInfo {
        let info = TenantInfo::from(record);
        self.put(info.clone());
        info
    }

    pub fn put(&self, info: TenantInfo) {
        if let Some(old) = self.tokens.insert(info.id, info.token.clone()) {
            if old != info.token {
                self.by_token.remove(&old);
            }
        }
        self.by_token.insert(info.token.clone(), info);
    }

    pub async fn set_webhook(&self, id: TenantId, url: &str) -> StoreResult<()> {
        self.store.set_webhook(id, url).await?;
        self.update(id, |info| info.webhook_url = url.to_string())
            .await
    }

    pub async fn set_subscriptions(
        &self,
        id: TenantId,
        subscriptions: &Subscriptions,
    ) -> StoreResult<()> {
        self.store.set_events(id, &subscriptions.to_stored()).await?;
        self.update(id, |info| info.subscriptions = subscriptions.clone())
            .await
    }

    pub async fn set_identity(&self, id: TenantId, identity: Option<&str>) -> StoreResult<()> {
        self.store.set_identity(id, identity).await?;
        self.update(id, |info| info.identity = identity.map(str::to_string))
            .await
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }

    /// Patch a cached entry in place, or load the already-written row
    async fn update<F>(&self, id: TenantId, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut TenantInfo),
    {
        let token = self.tokens.get(&id).map(|t| t.value().clone());
        if let Some(token) = token {
            if let Some(mut info) = self.by_token.get_mut(&token) {
                f(info.value_mut());
                return Ok(());
            }
        }

        if let Some(record) = self.store.load(id).await? {
            self.warm(&record);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_storage::MemoryTenantStore;
    use crate::types::EventCategory;

    fn cache_with(records: Vec<TenantRecord>) -> TenantInfoCache {
        TenantInfoCache::new(Arc::new(MemoryTenantStore::with_records(records)))
    }

    #[tokio::test]
    async fn test_read_through_by_token_and_id() {
        let cache = cache_with(vec![TenantRecord::new(1, "alpha").with_webhook("https://a.test")]);
        assert!(cache.is_empty());

        let info = cache.get("alpha").await.unwrap().unwrap();
        assert_eq!(info.webhook_url, "https://a.test");
        assert_eq!(cache.len(), 1);

        let by_id = cache.peek_by_id(TenantId(1)).unwrap();
        assert_eq!(by_id, info);
        assert!(cache.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_through_updates_store_and_cache() {
        let cache = cache_with(vec![TenantRecord::new(5, "five")]);
        let id = TenantId(5);
        cache.get_by_id(id).await.unwrap();

        cache.set_webhook(id, "https://b.test").await.unwrap();
        cache
            .set_subscriptions(id, &Subscriptions::normalize(&["Message"]))
            .await
            .unwrap();
        cache.set_identity(id, Some("900@s.test")).await.unwrap();

        let cached = cache.peek_by_id(id).unwrap();
        assert_eq!(cached.webhook_url, "https://b.test");
        assert!(cached.subscriptions.allows(EventCategory::Message));
        assert!(!cached.subscriptions.allows(EventCategory::Presence));
        assert_eq!(cached.identity.as_deref(), Some("900@s.test"));

        let stored = cache.store().load(id).await.unwrap().unwrap();
        assert_eq!(stored.webhook_url, "https://b.test");
        assert_eq!(stored.events, "Message");
    }

    #[tokio::test]
    async fn test_write_on_cold_entry_fills_cache() {
        let cache = cache_with(vec![TenantRecord::new(8, "eight")]);
        cache.set_webhook(TenantId(8), "https://c.test").await.unwrap();
        assert_eq!(
            cache.peek_by_id(TenantId(8)).unwrap().webhook_url,
            "https://c.test"
        );
    }
}
