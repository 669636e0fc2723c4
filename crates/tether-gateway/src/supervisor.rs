//! Session supervisor
//!
//! Owns the lifecycle of every tenant session:
//!
//! ```text
//! Idle -> Starting -> AwaitingPairing -> Connected -> Terminating -> Idle
//!                  \-> Connecting ----/
//! ```
//!
//! Each started session gets a driver task that pairs or connects, then
//! parks on the session's [`CancelSignal`](crate::CancelSignal) until a stop,
//! logout, pairing timeout or logged-out event fires it, and finally tears
//! the session down.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tether_config::SessionsConfig;
use tether_store::{Subscriptions, TenantId, TenantInfoCache};
use tracing::{debug, error, info, warn};

use crate::artifacts::{ArtifactStore, CodeRenderer, RawCodeRenderer};
use crate::dispatcher::{DispatchContext, Dispatcher};
use crate::error::{SessionError, SessionResult};
use crate::protocol::{PairingEvent, ProtocolSession, SessionConnector};
use crate::registry::{SessionEntry, SessionRegistry, SessionState};
use crate::webhook::WebhookQueue;

/// Supervisor tuning
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Readiness wait for synchronous starts
    pub connect_wait: Duration,
    pub media_download_timeout: Duration,
    pub max_media_downloads: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from(&SessionsConfig::default())
    }
}

impl From<&SessionsConfig> for SupervisorConfig {
    fn from(config: &SessionsConfig) -> Self {
        Self {
            connect_wait: Duration::from_secs(config.connect_wait_secs),
            media_download_timeout: Duration::from_secs(config.media_download_timeout_secs),
            max_media_downloads: config.max_media_downloads,
        }
    }
}

/// Connection status of a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub connected: bool,
    pub paired: bool,
}

/// How a driver left its start phase
enum StartOutcome {
    Connected,
    Stopped,
}

#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Arc<dyn SessionConnector>,
    cache: Arc<TenantInfoCache>,
    registry: SessionRegistry,
    renderer: Arc<dyn CodeRenderer>,
    dispatch: Arc<DispatchContext>,
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        cache: Arc<TenantInfoCache>,
        webhooks: WebhookQueue,
        artifacts: ArtifactStore,
        config: SupervisorConfig,
    ) -> Self {
        let registry = SessionRegistry::new();
        let dispatch = Arc::new(DispatchContext {
            cache: Arc::clone(&cache),
            registry: registry.clone(),
            artifacts,
            webhooks,
            media_timeout: config.media_download_timeout,
            media_permits: Arc::new(Semaphore::new(config.max_media_downloads.max(1))),
        });
        Self {
            inner: Arc::new(Inner {
                connector,
                cache,
                registry,
                renderer: Arc::new(RawCodeRenderer),
                dispatch,
                config,
            }),
        }
    }

    /// Replace the pairing code renderer. Has no effect once the supervisor
    /// has been cloned.
    pub fn with_renderer(mut self, renderer: Arc<dyn CodeRenderer>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.renderer = renderer,
            None => warn!("Supervisor already shared, renderer not replaced"),
        }
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn cache(&self) -> &Arc<TenantInfoCache> {
        &self.inner.cache
    }

    /// Register a session for `tenant` and drive it in the background.
    ///
    /// Without a stored identity the session goes through pairing first.
    pub fn start(
        &self,
        tenant: TenantId,
        identity: Option<String>,
    ) -> SessionResult<Arc<SessionEntry>> {
        let entry = self.register(tenant, identity.as_deref())?;
        Ok(self.launch(entry, identity.is_some()))
    }

    /// Open a session and claim the tenant's registry slot
    fn register(&self, tenant: TenantId, identity: Option<&str>) -> SessionResult<Arc<SessionEntry>> {
        if self.inner.registry.exists(tenant) {
            return Err(SessionError::AlreadyRunning(tenant));
        }

        let session = self.inner.connector.open(tenant, identity).map_err(|e| {
            error!(tenant = %tenant, "Failed to open session: {}", e);
            SessionError::FailedToConnect(tenant)
        })?;

        let entry = Arc::new(SessionEntry::new(tenant, session));
        self.inner.registry.try_insert(Arc::clone(&entry))?;
        Ok(entry)
    }

    /// Attach the dispatcher and spawn the driver for a registered entry
    fn launch(&self, entry: Arc<SessionEntry>, paired: bool) -> Arc<SessionEntry> {
        let tenant = entry.tenant();
        let session: &Arc<dyn ProtocolSession> = entry.session();
        let dispatcher = Dispatcher::new(
            tenant,
            entry.generation(),
            session,
            Arc::clone(&self.inner.dispatch),
        );
        session.set_event_sink(Arc::new(dispatcher));

        info!(tenant = %tenant, paired, "Starting session");
        let inner = Arc::clone(&self.inner);
        let driven = Arc::clone(&entry);
        tokio::spawn(async move { inner.drive(driven, paired).await });

        entry
    }

    /// Entry point for the connect API: persist subscriptions, start, and
    /// unless `immediate`, wait for the transport to come up.
    pub async fn start_session<S: AsRef<str>>(
        &self,
        tenant: TenantId,
        requested: &[S],
        immediate: bool,
    ) -> SessionResult<Subscriptions> {
        if self.inner.registry.exists(tenant) {
            return Err(SessionError::AlreadyRunning(tenant));
        }

        let info = self
            .inner
            .cache
            .get_by_id(tenant)
            .await?
            .ok_or(SessionError::TenantNotFound(tenant))?;

        let subscriptions = Subscriptions::normalize(requested);
        let entry = self.register(tenant, info.identity.as_deref())?;
        if let Err(e) = self
            .inner
            .cache
            .set_subscriptions(tenant, &subscriptions)
            .await
        {
            self.inner.registry.remove_owned(tenant, entry.generation());
            return Err(e.into());
        }

        let entry = self.launch(entry, info.identity.is_some());
        if !immediate {
            self.wait_ready(&entry).await?;
        }
        Ok(subscriptions)
    }

    /// Wait until the session is up, bounded by `connect_wait`
    pub async fn wait_ready(&self, entry: &SessionEntry) -> SessionResult<()> {
        let mut rx = entry.subscribe();
        let wait = rx.wait_for(|state| state.is_ready() || state.is_finished());
        // the watch borrow must end before `rx` is dropped
        #[allow(clippy::let_and_return)]
        let result = match tokio::time::timeout(self.inner.config.connect_wait, wait).await {
            Ok(Ok(state)) if state.is_ready() => Ok(()),
            Ok(_) => Err(SessionError::FailedToConnect(entry.tenant())),
            Err(_) => {
                warn!(tenant = %entry.tenant(), "Session not ready in time");
                Err(SessionError::FailedToConnect(entry.tenant()))
            }
        };
        result
    }

    pub async fn stop(&self, tenant: TenantId) -> SessionResult<()> {
        let entry = self.connected_entry(tenant)?;

        info!(tenant = %tenant, "Stopping session");
        entry.cancel().signal();

        if let Err(e) = self
            .inner
            .cache
            .set_subscriptions(tenant, &Subscriptions::default())
            .await
        {
            error!(tenant = %tenant, "Failed to clear subscriptions: {}", e);
        }
        Ok(())
    }

    /// Unbind the device identity and stop; the next start needs pairing
    pub async fn logout(&self, tenant: TenantId) -> SessionResult<()> {
        let entry = self.connected_entry(tenant)?;

        entry
            .session()
            .logout()
            .await
            .map_err(|e| SessionError::LogoutFailed {
                tenant,
                message: e.to_string(),
            })?;

        info!(tenant = %tenant, "Logged out");
        if let Err(e) = self.inner.cache.set_identity(tenant, None).await {
            error!(tenant = %tenant, "Failed to clear identity: {}", e);
        }
        entry.set_state(SessionState::LoggedOut);
        entry.cancel().signal();
        Ok(())
    }

    pub fn status(&self, tenant: TenantId) -> SessionResult<SessionStatus> {
        let entry = self
            .inner
            .registry
            .get(tenant)
            .ok_or(SessionError::NoSession(tenant))?;
        let session = entry.session();
        Ok(SessionStatus {
            connected: session.is_connected(),
            paired: session.is_paired(),
        })
    }

    /// The stored pairing artifact while the session waits for a scan
    pub async fn pairing_artifact(&self, tenant: TenantId) -> SessionResult<String> {
        let entry = self
            .inner
            .registry
            .get(tenant)
            .ok_or(SessionError::NoSession(tenant))?;
        let session = entry.session();
        if !session.is_connected() {
            return Err(SessionError::NotConnected(tenant));
        }
        if session.is_paired() {
            return Err(SessionError::AlreadyLoggedIn(tenant));
        }

        self.inner
            .cache
            .store()
            .pairing_code(tenant)
            .await?
            .filter(|code| !code.is_empty())
            .ok_or(SessionError::NotAvailable(tenant))
    }

    pub async fn set_callback(&self, tenant: TenantId, url: &str) -> SessionResult<()> {
        self.inner.cache.set_webhook(tenant, url).await?;
        info!(tenant = %tenant, url = %url, "Webhook updated");
        Ok(())
    }

    pub async fn set_subscriptions<S: AsRef<str>>(
        &self,
        tenant: TenantId,
        requested: &[S],
    ) -> SessionResult<Subscriptions> {
        let subscriptions = Subscriptions::normalize(requested);
        self.inner
            .cache
            .set_subscriptions(tenant, &subscriptions)
            .await?;
        Ok(subscriptions)
    }

    /// Restart every tenant that was connected at last shutdown. Returns the
    /// number of sessions launched; individual connects are not awaited.
    pub async fn resume_sessions(&self) -> SessionResult<usize> {
        let records = self.inner.cache.store().list_connected().await?;
        info!("Resuming {} sessions", records.len());

        let mut started = 0;
        for record in records {
            self.inner.cache.warm(&record);
            match self.start(record.id, record.identity.clone()) {
                Ok(_) => started += 1,
                Err(e) => warn!(tenant = %record.id, "Failed to resume session: {}", e),
            }
        }
        Ok(started)
    }

    fn connected_entry(&self, tenant: TenantId) -> SessionResult<Arc<SessionEntry>> {
        let entry = self
            .inner
            .registry
            .get(tenant)
            .ok_or(SessionError::NoSession(tenant))?;
        let session = entry.session();
        if !session.is_connected() {
            return Err(SessionError::NotConnected(tenant));
        }
        if !session.is_paired() {
            return Err(SessionError::NotLoggedIn(tenant));
        }
        Ok(entry)
    }
}

impl Inner {
    async fn drive(self: Arc<Self>, entry: Arc<SessionEntry>, paired: bool) {
        let tenant = entry.tenant();
        let outcome = if paired {
            self.connect(&entry).await
        } else {
            self.pair(&entry).await
        };

        let reached_connected = matches!(outcome, StartOutcome::Connected);
        if reached_connected {
            entry.set_state(SessionState::Connected);
            if let Err(e) = self.cache.store().set_connected(tenant, true).await {
                error!(tenant = %tenant, "Failed to mark tenant connected: {}", e);
            }
            info!(tenant = %tenant, "Session connected");
            entry.cancel().cancelled().await;
            debug!(tenant = %tenant, "Cancellation received");
        }

        self.teardown(&entry, reached_connected).await;
    }

    /// Connect with a stored identity
    async fn connect(&self, entry: &SessionEntry) -> StartOutcome {
        let tenant = entry.tenant();
        entry.set_state(SessionState::Connecting);

        tokio::select! {
            result = entry.session().connect() => match result {
                Ok(()) => StartOutcome::Connected,
                Err(e) => {
                    error!(tenant = %tenant, "Failed to connect: {}", e);
                    StartOutcome::Stopped
                }
            },
            _ = entry.cancel().cancelled() => StartOutcome::Stopped,
        }
    }

    /// Pair a fresh device: follow the code stream until success or timeout
    async fn pair(&self, entry: &SessionEntry) -> StartOutcome {
        let tenant = entry.tenant();
        let session = entry.session();

        let mut events = match session.pairing_events().await {
            Ok(events) => events,
            Err(e) => {
                error!(tenant = %tenant, "Failed to get pairing channel: {}", e);
                return StartOutcome::Stopped;
            }
        };

        tokio::select! {
            result = session.connect() => {
                if let Err(e) = result {
                    error!(tenant = %tenant, "Failed to connect: {}", e);
                    return StartOutcome::Stopped;
                }
            }
            _ = entry.cancel().cancelled() => return StartOutcome::Stopped,
        }
        entry.set_state(SessionState::AwaitingPairing);

        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = entry.cancel().cancelled() => return StartOutcome::Stopped,
            };

            match event {
                Some(PairingEvent::Code(code)) => {
                    let artifact = self.renderer.render(&code);
                    if let Err(e) = self.cache.store().set_pairing_code(tenant, Some(&artifact)).await {
                        error!(tenant = %tenant, "Failed to store pairing code: {}", e);
                    }
                    info!(tenant = %tenant, "Pairing code issued");
                }
                Some(PairingEvent::Timeout) => {
                    info!(tenant = %tenant, "Pairing timed out");
                    self.clear_pairing_code(tenant).await;
                    entry.cancel().signal();
                    return StartOutcome::Stopped;
                }
                Some(PairingEvent::Success) => {
                    info!(tenant = %tenant, "Pairing succeeded");
                    self.clear_pairing_code(tenant).await;
                    return StartOutcome::Connected;
                }
                Some(PairingEvent::Other(what)) => {
                    info!(tenant = %tenant, event = %what, "Pairing event");
                }
                None if session.is_paired() => return StartOutcome::Connected,
                None => {
                    warn!(tenant = %tenant, "Pairing stream closed before pairing");
                    return StartOutcome::Stopped;
                }
            }
        }
    }

    async fn clear_pairing_code(&self, tenant: TenantId) {
        if let Err(e) = self.cache.store().set_pairing_code(tenant, None).await {
            error!(tenant = %tenant, "Failed to clear pairing code: {}", e);
        }
    }

    /// Disconnect and deregister. Store failures are logged only.
    ///
    /// The stored connected flag is only cleared for sessions that got
    /// connected, so a failed resume stays eligible for the next one.
    async fn teardown(&self, entry: &SessionEntry, reached_connected: bool) {
        let tenant = entry.tenant();
        let logged_out = entry.state() == SessionState::LoggedOut;
        entry.set_state(SessionState::Terminating);
        entry.cancel().signal();

        entry.session().disconnect().await;
        if !self.registry.remove_owned(tenant, entry.generation()) {
            debug!(tenant = %tenant, "Registry entry already replaced");
        }

        if reached_connected || logged_out {
            if let Err(e) = self.cache.store().set_connected(tenant, false).await {
                error!(tenant = %tenant, "Failed to mark tenant disconnected: {}", e);
            }
        }
        self.clear_pairing_code(tenant).await;

        entry.set_state(if logged_out {
            SessionState::LoggedOut
        } else {
            SessionState::Idle
        });
        info!(tenant = %tenant, "Session terminated");
    }
}
