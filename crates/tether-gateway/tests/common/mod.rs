//! Shared fixtures: a scripted protocol session, a recording webhook sender
//! and a harness wiring them into a supervisor.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tether_config::WebhookConfig;
use tether_gateway::{
    ArtifactStore, DeliveryResult, DispatchEnvelope, EventSink, MediaAttachment, PairingEvent,
    ProtocolError, ProtocolEvent, ProtocolSession, SessionConnector, Supervisor, SupervisorConfig,
    WebhookSender, WebhookWorker,
};
use tether_store::{MemoryTenantStore, TenantId, TenantInfoCache, TenantRecord, TenantStore};
use tokio::sync::mpsc;

/// Protocol session driven by the test
pub struct MockSession {
    connected: AtomicBool,
    paired: AtomicBool,
    fail_connect: bool,
    push_name: Option<String>,
    media: Option<Vec<u8>>,
    downloads: Arc<DownloadGauge>,
    pairing_tx: Mutex<Option<mpsc::Sender<PairingEvent>>>,
    sink: Mutex<Option<Arc<dyn EventSink>>>,
    pub disconnects: AtomicUsize,
    pub presence_announcements: AtomicUsize,
}

impl MockSession {
    pub fn is_connected_now(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Push an event onto the pairing stream
    pub async fn pairing(&self, event: PairingEvent) {
        if event == PairingEvent::Success {
            self.paired.store(true, Ordering::SeqCst);
        }
        let tx = self.pairing_tx.lock().clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    /// Deliver an inbound protocol event the way the client would
    pub async fn emit(&self, event: ProtocolEvent) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.handle_event(event).await;
        }
    }
}

#[async_trait]
impl ProtocolSession for MockSession {
    async fn connect(&self) -> Result<(), ProtocolError> {
        if self.fail_connect {
            return Err(ProtocolError::Connect("network unreachable".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_paired(&self) -> bool {
        self.paired.load(Ordering::SeqCst)
    }

    async fn logout(&self) -> Result<(), ProtocolError> {
        self.paired.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn pairing_events(&self) -> Result<mpsc::Receiver<PairingEvent>, ProtocolError> {
        let (tx, rx) = mpsc::channel(8);
        *self.pairing_tx.lock() = Some(tx);
        Ok(rx)
    }

    fn set_event_sink(&self, sink: Arc<dyn EventSink>) {
        *self.sink.lock() = Some(sink);
    }

    async fn download(&self, _media: &MediaAttachment) -> Result<Vec<u8>, ProtocolError> {
        let active = self.downloads.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.downloads.peak.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.downloads.active.fetch_sub(1, Ordering::SeqCst);

        self.media
            .clone()
            .ok_or_else(|| ProtocolError::Download("media expired".into()))
    }

    fn push_name(&self) -> Option<String> {
        self.push_name.clone()
    }

    async fn send_presence_available(&self) -> Result<(), ProtocolError> {
        self.presence_announcements.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Concurrent media downloads across every mock session
#[derive(Default)]
pub struct DownloadGauge {
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
}

/// Opens [`MockSession`]s and remembers the latest one per tenant
#[derive(Default)]
pub struct MockConnector {
    pub fail_connect: AtomicBool,
    pub push_name: Mutex<Option<String>>,
    pub media: Mutex<Option<Vec<u8>>>,
    pub downloads: Arc<DownloadGauge>,
    sessions: Mutex<HashMap<TenantId, Arc<MockSession>>>,
}

impl MockConnector {
    pub fn session(&self, tenant: TenantId) -> Arc<MockSession> {
        self.sessions
            .lock()
            .get(&tenant)
            .cloned()
            .expect("no session opened for tenant")
    }
}

impl SessionConnector for MockConnector {
    fn open(
        &self,
        tenant: TenantId,
        identity: Option<&str>,
    ) -> Result<Arc<dyn ProtocolSession>, ProtocolError> {
        let session = Arc::new(MockSession {
            connected: AtomicBool::new(false),
            paired: AtomicBool::new(identity.is_some()),
            fail_connect: self.fail_connect.load(Ordering::SeqCst),
            push_name: self.push_name.lock().clone(),
            media: self.media.lock().clone(),
            downloads: Arc::clone(&self.downloads),
            pairing_tx: Mutex::new(None),
            sink: Mutex::new(None),
            disconnects: AtomicUsize::new(0),
            presence_announcements: AtomicUsize::new(0),
        });
        self.sessions.lock().insert(tenant, Arc::clone(&session));
        Ok(session)
    }
}

/// Webhook sender that records envelopes instead of calling out
#[derive(Default)]
pub struct RecordingSender {
    envelopes: Mutex<Vec<DispatchEnvelope>>,
}

impl RecordingSender {
    pub fn envelopes(&self) -> Vec<DispatchEnvelope> {
        self.envelopes.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.envelopes.lock().len()
    }
}

#[async_trait]
impl WebhookSender for RecordingSender {
    async fn send(&self, envelope: &DispatchEnvelope) -> DeliveryResult<()> {
        self.envelopes.lock().push(envelope.clone());
        Ok(())
    }
}

pub struct Harness {
    pub supervisor: Supervisor,
    pub connector: Arc<MockConnector>,
    pub store: Arc<MemoryTenantStore>,
    pub sender: Arc<RecordingSender>,
    pub data_dir: TempDir,
}

impl Harness {
    pub fn new(records: Vec<TenantRecord>) -> Self {
        Self::with_config(records, SupervisorConfig {
            connect_wait: Duration::from_secs(2),
            media_download_timeout: Duration::from_secs(2),
            ..SupervisorConfig::default()
        })
    }

    pub fn with_config(records: Vec<TenantRecord>, config: SupervisorConfig) -> Self {
        let store = Arc::new(MemoryTenantStore::with_records(records));
        let dyn_store: Arc<dyn TenantStore> = store.clone();
        let cache = Arc::new(TenantInfoCache::new(dyn_store));

        let sender = Arc::new(RecordingSender::default());
        let (queue, _pump) = WebhookWorker::spawn(sender.clone(), &WebhookConfig::default());

        let data_dir = TempDir::new().unwrap();
        let connector = Arc::new(MockConnector::default());
        let supervisor = Supervisor::new(
            connector.clone(),
            cache,
            queue,
            ArtifactStore::new(data_dir.path()),
            config,
        );

        Self {
            supervisor,
            connector,
            store,
            sender,
            data_dir,
        }
    }

    pub async fn record(&self, tenant: TenantId) -> TenantRecord {
        self.store.load(tenant).await.unwrap().unwrap()
    }
}

/// Paired tenant with a webhook and the given stored subscriptions
pub fn paired_tenant(id: u64, events: &str) -> TenantRecord {
    let mut record = TenantRecord::new(id, format!("token-{}", id))
        .with_identity(format!("{}@s.test", id))
        .with_webhook(format!("https://hooks.test/{}", id));
    record.events = events.to_string();
    record
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Async variant of [`eventually`] for conditions that read the store
pub async fn eventually_async<F, Fut>(condition: F) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition().await
}
