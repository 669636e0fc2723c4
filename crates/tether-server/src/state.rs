//! Application state shared by all controllers

use std::sync::Arc;

use tether_config::{init_data_dirs, Config};
use tether_gateway::{
    ArtifactStore, HttpWebhookSender, SessionConnector, Supervisor, SupervisorConfig,
    WebhookWorker,
};
use tether_store::{JsonTenantStore, TenantInfoCache, TenantStore};
use tracing::info;

use crate::error::ServerResult;

pub struct AppState {
    pub supervisor: Supervisor,
    pub config: Config,
}

impl AppState {
    pub fn new(supervisor: Supervisor, config: Config) -> Self {
        Self { supervisor, config }
    }

    /// Wire the JSON tenant store, the cache, the webhook worker and the
    /// artifact directory into a supervisor for `connector`
    pub async fn build(config: Config, connector: Arc<dyn SessionConnector>) -> ServerResult<Self> {
        let store = JsonTenantStore::open(&config.storage.path).await?;
        info!(path = %store.path().display(), "Tenant store opened");
        let store: Arc<dyn TenantStore> = Arc::new(store);
        let cache = Arc::new(TenantInfoCache::new(store));

        let sender = Arc::new(HttpWebhookSender::new(&config.webhook)?);
        let (webhooks, _pump) = WebhookWorker::spawn(sender, &config.webhook);

        let data_dir = init_data_dirs(&config).await?;
        info!(data_dir = %data_dir.display(), "Artifact directory ready");

        let supervisor = Supervisor::new(
            connector,
            cache,
            webhooks,
            ArtifactStore::new(&data_dir),
            SupervisorConfig::from(&config.sessions),
        );
        Ok(Self::new(supervisor, config))
    }

    pub fn cache(&self) -> &Arc<TenantInfoCache> {
        self.supervisor.cache()
    }

    /// Restart the sessions of tenants stored as connected, if enabled
    pub async fn resume(&self) -> ServerResult<usize> {
        if !self.config.sessions.resume_on_startup {
            info!("Session resume disabled");
            return Ok(0);
        }
        let resumed = self.supervisor.resume_sessions().await?;
        info!(resumed, "Resumed stored sessions");
        Ok(resumed)
    }
}
