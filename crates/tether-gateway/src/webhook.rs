//! Webhook delivery worker
//!
//! Dispatch envelopes are queued on a bounded channel and delivered by a pump
//! task that runs each call as its own task, capped by a semaphore. Delivery
//! is at-most-once: no retry, failures are logged with the target URL.

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tether_config::WebhookConfig;
use tether_store::{EventCategory, TenantId};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{DeliveryError, DeliveryResult};

/// Form field carrying the JSON payload
pub const PAYLOAD_FIELD: &str = "jsonData";
/// Multipart part carrying the artifact
pub const FILE_FIELD: &str = "file";

/// One outbound notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchEnvelope {
    pub tenant: TenantId,
    pub category: EventCategory,
    pub url: String,
    /// Serialized JSON payload
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

/// Performs one delivery call
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(&self, envelope: &DispatchEnvelope) -> DeliveryResult<()>;
}

/// reqwest-backed sender: form-encoded payload, or multipart when an
/// artifact is attached
#[derive(Clone)]
pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl HttpWebhookSender {
    pub fn new(config: &WebhookConfig) -> DeliveryResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(&self, envelope: &DispatchEnvelope) -> DeliveryResult<()> {
        let request = self.client.post(&envelope.url);
        let request = match &envelope.artifact {
            None => request.form(&[(PAYLOAD_FIELD, envelope.payload.as_str())]),
            Some(path) => {
                let bytes = tokio::fs::read(path).await?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "file".to_string());
                let form = reqwest::multipart::Form::new()
                    .text(PAYLOAD_FIELD, envelope.payload.clone())
                    .part(
                        FILE_FIELD,
                        reqwest::multipart::Part::bytes(bytes).file_name(file_name),
                    );
                request.multipart(form)
            }
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status {
                url: envelope.url.clone(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Producer side of the delivery queue
#[derive(Clone)]
pub struct WebhookQueue {
    tx: mpsc::Sender<DispatchEnvelope>,
}

impl WebhookQueue {
    /// Enqueue without waiting; a full queue drops the envelope
    pub fn submit(&self, envelope: DispatchEnvelope) -> DeliveryResult<()> {
        self.tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

pub struct WebhookWorker;

impl WebhookWorker {
    /// Start the pump. It runs until every [`WebhookQueue`] clone is dropped.
    pub fn spawn(
        sender: Arc<dyn WebhookSender>,
        config: &WebhookConfig,
    ) -> (WebhookQueue, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        let handle = tokio::spawn(Self::pump(rx, sender, permits));
        (WebhookQueue { tx }, handle)
    }

    async fn pump(
        mut rx: mpsc::Receiver<DispatchEnvelope>,
        sender: Arc<dyn WebhookSender>,
        permits: Arc<Semaphore>,
    ) {
        while let Some(envelope) = rx.recv().await {
            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let sender = Arc::clone(&sender);
            tokio::spawn(async move {
                let _permit = permit;
                deliver(sender.as_ref(), &envelope).await;
            });
        }
        debug!("Webhook queue closed, pump exiting");
    }
}

async fn deliver(sender: &dyn WebhookSender, envelope: &DispatchEnvelope) {
    info!(
        tenant = %envelope.tenant,
        url = %envelope.url,
        category = %envelope.category,
        with_file = envelope.artifact.is_some(),
        "Calling webhook"
    );
    match sender.send(envelope).await {
        Ok(()) => debug!(tenant = %envelope.tenant, url = %envelope.url, "Webhook delivered"),
        Err(DeliveryError::Status { url, status }) => {
            warn!(tenant = %envelope.tenant, url = %url, status, "Webhook rejected")
        }
        Err(e) => error!(tenant = %envelope.tenant, url = %envelope.url, "Webhook failed: {}", e),
    }
}
