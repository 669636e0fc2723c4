//! Session registry
//!
//! Process-wide map from tenant to the live session and its cancellation
//! signal. Insertion is an atomic check-and-insert; removal only succeeds for
//! the generation that inserted the entry, so a stale teardown can never
//! evict a newer session.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tether_store::TenantId;
use tokio::sync::watch;
use uuid::Uuid;

use crate::cancel::CancelSignal;
use crate::error::{SessionError, SessionResult};
use crate::protocol::ProtocolSession;

/// Lifecycle state of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Starting,
    AwaitingPairing,
    Connecting,
    Connected,
    Terminating,
    LoggedOut,
}

impl SessionState {
    /// Transport is up, either waiting for a code scan or fully connected
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::AwaitingPairing | SessionState::Connected)
    }

    /// The session will not become ready any more
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            SessionState::Terminating | SessionState::Idle | SessionState::LoggedOut
        )
    }
}

/// One registered session
pub struct SessionEntry {
    tenant: TenantId,
    generation: Uuid,
    session: Arc<dyn ProtocolSession>,
    cancel: CancelSignal,
    state: watch::Sender<SessionState>,
    started_at: DateTime<Utc>,
}

impl SessionEntry {
    pub fn new(tenant: TenantId, session: Arc<dyn ProtocolSession>) -> Self {
        let (state, _) = watch::channel(SessionState::Starting);
        Self {
            tenant,
            generation: Uuid::new_v4(),
            session,
            cancel: CancelSignal::new(),
            state,
            started_at: Utc::now(),
        }
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    pub fn generation(&self) -> Uuid {
        self.generation
    }

    pub fn session(&self) -> &Arc<dyn ProtocolSession> {
        &self.session
    }

    pub fn cancel(&self) -> &CancelSignal {
        &self.cancel
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }
}

impl std::fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEntry")
            .field("tenant", &self.tenant)
            .field("generation", &self.generation)
            .field("state", &self.state())
            .field("started_at", &self.started_at)
            .finish()
    }
}

/// Tenant → live session map shared by every component
#[derive(Clone, Default)]
pub struct SessionRegistry {
    entries: Arc<DashMap<TenantId, Arc<SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entry` unless its tenant already has one
    pub fn try_insert(&self, entry: Arc<SessionEntry>) -> SessionResult<()> {
        match self.entries.entry(entry.tenant()) {
            Entry::Occupied(_) => Err(SessionError::AlreadyRunning(entry.tenant())),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    pub fn exists(&self, tenant: TenantId) -> bool {
        self.entries.contains_key(&tenant)
    }

    pub fn get(&self, tenant: TenantId) -> Option<Arc<SessionEntry>> {
        self.entries.get(&tenant).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove the tenant's entry if it still belongs to `generation`
    pub(crate) fn remove_owned(&self, tenant: TenantId, generation: Uuid) -> bool {
        self.entries
            .remove_if(&tenant, |_, entry| entry.generation() == generation)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<TenantId> = self.entries.iter().map(|e| *e.key()).collect();
        tenants.sort();
        tenants
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::protocol::{EventSink, MediaAttachment, PairingEvent};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct NullSession;

    #[async_trait]
    impl ProtocolSession for NullSession {
        async fn connect(&self) -> Result<(), ProtocolError> {
            Ok(())
        }
        async fn disconnect(&self) {}
        fn is_connected(&self) -> bool {
            false
        }
        fn is_paired(&self) -> bool {
            false
        }
        async fn logout(&self) -> Result<(), ProtocolError> {
            Ok(())
        }
        async fn pairing_events(&self) -> Result<mpsc::Receiver<PairingEvent>, ProtocolError> {
            Err(ProtocolError::Pairing("unsupported".into()))
        }
        fn set_event_sink(&self, _sink: Arc<dyn EventSink>) {}
        async fn download(&self, _media: &MediaAttachment) -> Result<Vec<u8>, ProtocolError> {
            Ok(Vec::new())
        }
        fn push_name(&self) -> Option<String> {
            None
        }
        async fn send_presence_available(&self) -> Result<(), ProtocolError> {
            Ok(())
        }
    }

    fn entry(tenant: u64) -> Arc<SessionEntry> {
        Arc::new(SessionEntry::new(TenantId(tenant), Arc::new(NullSession)))
    }

    #[test]
    fn test_second_insert_is_rejected() {
        let registry = SessionRegistry::new();
        registry.try_insert(entry(1)).unwrap();

        assert!(matches!(
            registry.try_insert(entry(1)),
            Err(SessionError::AlreadyRunning(TenantId(1)))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_generation_cannot_remove() {
        let registry = SessionRegistry::new();
        let old = entry(2);
        let old_generation = old.generation();
        registry.try_insert(old).unwrap();
        assert!(registry.remove_owned(TenantId(2), old_generation));

        let newer = entry(2);
        registry.try_insert(Arc::clone(&newer)).unwrap();
        assert!(!registry.remove_owned(TenantId(2), old_generation));
        assert!(registry.exists(TenantId(2)));
        assert!(registry.remove_owned(TenantId(2), newer.generation()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_signal_through_lookup_fires_once() {
        let registry = SessionRegistry::new();
        let inserted = entry(3);
        registry.try_insert(Arc::clone(&inserted)).unwrap();

        let found = registry.get(TenantId(3)).unwrap();
        assert!(found.cancel().signal());
        assert!(!inserted.cancel().signal());
        assert!(inserted.cancel().is_signaled());
    }

    #[test]
    fn test_state_helpers() {
        assert!(SessionState::AwaitingPairing.is_ready());
        assert!(SessionState::Connected.is_ready());
        assert!(!SessionState::Connecting.is_ready());
        assert!(SessionState::LoggedOut.is_finished());
        assert_eq!(entry(4).state(), SessionState::Starting);
    }
}
