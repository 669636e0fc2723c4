//! Event dispatcher
//!
//! One [`Dispatcher`] per tenant session receives every inbound protocol
//! event, applies its local side effects (store updates, artifact files,
//! cancellation on logout) and hands subscribed notifications to the webhook
//! queue without waiting for delivery.

use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tether_store::{EventCategory, TenantId, TenantInfoCache};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::artifacts::{extension_for, ArtifactStore};
use crate::event::{MessageEvent, ProtocolEvent, ReceiptKind, CRITICAL_BLOCK};
use crate::protocol::{EventSink, ProtocolSession};
use crate::registry::{SessionEntry, SessionRegistry, SessionState};
use crate::webhook::{DispatchEnvelope, WebhookQueue};

/// Collaborators shared by every tenant's dispatcher
pub struct DispatchContext {
    pub cache: Arc<TenantInfoCache>,
    pub registry: SessionRegistry,
    pub artifacts: ArtifactStore,
    pub webhooks: WebhookQueue,
    pub media_timeout: Duration,
    /// Bounds concurrent media downloads across all tenants
    pub media_permits: Arc<Semaphore>,
}

/// A notification candidate before subscription filtering
#[derive(Debug)]
struct Notification {
    category: EventCategory,
    event: serde_json::Value,
    state: Option<&'static str>,
    artifact: Option<PathBuf>,
}

impl Notification {
    fn new(category: EventCategory, event: serde_json::Value) -> Self {
        Self {
            category,
            event,
            state: None,
            artifact: None,
        }
    }

    fn with_state(mut self, state: &'static str) -> Self {
        self.state = Some(state);
        self
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    tenant: TenantId,
    /// Registry generation of the session this dispatcher serves
    generation: Uuid,
    session: Weak<dyn ProtocolSession>,
    ctx: Arc<DispatchContext>,
}

impl Dispatcher {
    pub fn new(
        tenant: TenantId,
        generation: Uuid,
        session: &Arc<dyn ProtocolSession>,
        ctx: Arc<DispatchContext>,
    ) -> Self {
        Self {
            tenant,
            generation,
            session: Arc::downgrade(session),
            ctx,
        }
    }

    /// The registry entry, if it still belongs to this dispatcher's session
    fn owned_entry(&self) -> Option<Arc<SessionEntry>> {
        self.ctx
            .registry
            .get(self.tenant)
            .filter(|entry| entry.generation() == self.generation)
    }

    fn is_current(&self, kind: &str) -> bool {
        let current = self.owned_entry().is_some();
        if !current {
            debug!(tenant = %self.tenant, generation = %self.generation, kind, "Dropping event from replaced session");
        }
        current
    }

    pub async fn dispatch(&self, event: ProtocolEvent) {
        let tenant = self.tenant;
        let notification = match event {
            ProtocolEvent::Connected | ProtocolEvent::PushNameSetting => {
                if self.is_current("connected") {
                    self.on_connected().await;
                }
                None
            }
            ProtocolEvent::AppStateSyncComplete { name } => {
                if name == CRITICAL_BLOCK && self.has_push_name() && self.is_current("app_state_sync") {
                    self.announce_presence().await;
                }
                None
            }
            ProtocolEvent::PairSuccess(pair) => {
                if !self.is_current("pair_success") {
                    return;
                }
                info!(
                    tenant = %tenant,
                    id = %pair.id,
                    business_name = %pair.business_name,
                    platform = %pair.platform,
                    "Pair success"
                );
                if let Err(e) = self.ctx.cache.set_identity(tenant, Some(&pair.id)).await {
                    error!(tenant = %tenant, "Failed to persist identity: {}", e);
                }
                None
            }
            ProtocolEvent::StreamReplaced => {
                info!(tenant = %tenant, "Stream replaced");
                None
            }
            ProtocolEvent::Message(message) => self.on_message(message),
            ProtocolEvent::Receipt(receipt) => {
                let state = match receipt.kind {
                    ReceiptKind::Read => "Read",
                    ReceiptKind::ReadSelf => "ReadSelf",
                    ReceiptKind::Delivered => "Delivered",
                    ref other => {
                        debug!(tenant = %tenant, kind = ?other, "Ignoring receipt");
                        return;
                    }
                };
                info!(
                    tenant = %tenant,
                    ids = ?receipt.message_ids,
                    source = %receipt.chat,
                    state,
                    "Receipt"
                );
                Some(Notification::new(EventCategory::ReadReceipt, to_value(&receipt)).with_state(state))
            }
            ProtocolEvent::Presence(presence) => {
                let state = if presence.unavailable {
                    match presence.last_seen {
                        Some(last_seen) => {
                            info!(tenant = %tenant, from = %presence.from, last_seen = %last_seen, "User is now offline")
                        }
                        None => info!(tenant = %tenant, from = %presence.from, "User is now offline"),
                    }
                    "offline"
                } else {
                    info!(tenant = %tenant, from = %presence.from, "User is now online");
                    "online"
                };
                Some(Notification::new(EventCategory::Presence, to_value(&presence)).with_state(state))
            }
            ProtocolEvent::ChatPresence(presence) => {
                info!(
                    tenant = %tenant,
                    chat = %presence.chat,
                    sender = %presence.sender,
                    state = %presence.state,
                    "Chat presence"
                );
                Some(Notification::new(EventCategory::ChatPresence, to_value(&presence)))
            }
            ProtocolEvent::HistorySync(history) => {
                match self.ctx.artifacts.write_history(tenant, &history.data).await {
                    Ok(path) => info!(tenant = %tenant, path = %path.display(), "Wrote history sync"),
                    Err(e) => error!(tenant = %tenant, "Failed to write history sync: {}", e),
                }
                Some(Notification::new(EventCategory::HistorySync, to_value(&history)))
            }
            ProtocolEvent::AppState(state) => {
                info!(tenant = %tenant, index = ?state.index, "App state event");
                None
            }
            ProtocolEvent::LoggedOut(logged_out) => {
                match self.owned_entry() {
                    Some(entry) => {
                        info!(tenant = %tenant, reason = %logged_out.reason, "Logged out");
                        self.on_logged_out(&entry).await;
                    }
                    None => {
                        debug!(tenant = %tenant, generation = %self.generation, "Ignoring logout of replaced session");
                    }
                }
                None
            }
            ProtocolEvent::Call(call) => {
                info!(tenant = %tenant, phase = ?call.phase, from = %call.from, call_id = %call.call_id, "Call event");
                None
            }
            ProtocolEvent::Unknown { kind, .. } => {
                warn!(tenant = %tenant, kind = %kind, "Unhandled event");
                None
            }
        };

        if let Some(notification) = notification {
            self.notify(notification).await;
        }
    }

    fn session(&self) -> Option<Arc<dyn ProtocolSession>> {
        self.session.upgrade()
    }

    fn has_push_name(&self) -> bool {
        self.session()
            .and_then(|s| s.push_name())
            .map(|name| !name.is_empty())
            .unwrap_or(false)
    }

    async fn announce_presence(&self) {
        let Some(session) = self.session() else {
            return;
        };
        match session.send_presence_available().await {
            Ok(()) => info!(tenant = %self.tenant, "Marked self as available"),
            Err(e) => warn!(tenant = %self.tenant, "Failed to send available presence: {}", e),
        }
    }

    async fn on_connected(&self) {
        if !self.has_push_name() {
            return;
        }
        self.announce_presence().await;
        if let Err(e) = self.ctx.cache.store().set_connected(self.tenant, true).await {
            error!(tenant = %self.tenant, "Failed to mark tenant connected: {}", e);
        }
    }

    async fn on_logged_out(&self, entry: &SessionEntry) {
        let tenant = self.tenant;
        if let Err(e) = self.ctx.cache.store().set_connected(tenant, false).await {
            error!(tenant = %tenant, "Failed to mark tenant disconnected: {}", e);
        }
        if let Err(e) = self.ctx.cache.set_identity(tenant, None).await {
            error!(tenant = %tenant, "Failed to clear identity: {}", e);
        }
        entry.set_state(SessionState::LoggedOut);
        if !entry.cancel().signal() {
            debug!(tenant = %tenant, "Session already stopping");
        }
    }

    fn on_message(&self, message: MessageEvent) -> Option<Notification> {
        info!(
            tenant = %self.tenant,
            id = %message.info.id,
            chat = %message.info.chat,
            sender = %message.info.sender,
            push_name = %message.info.push_name,
            view_once = message.is_view_once,
            "Message received"
        );

        if message.media.is_none() {
            return Some(Notification::new(EventCategory::Message, to_value(&message)));
        }

        // Downloads run off the dispatch path; the notification follows them
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let artifact = match Arc::clone(&dispatcher.ctx.media_permits).acquire_owned().await {
                Ok(_permit) => dispatcher.save_media(&message).await,
                Err(_) => None,
            };
            let mut notification = Notification::new(EventCategory::Message, to_value(&message));
            notification.artifact = artifact;
            dispatcher.notify(notification).await;
        });
        None
    }

    /// Download and store attached media; failures only cost the attachment
    async fn save_media(&self, message: &MessageEvent) -> Option<PathBuf> {
        let media = message.media.as_ref()?;
        let session = self.session()?;
        let kind = media.kind.as_str();

        let bytes = match tokio::time::timeout(self.ctx.media_timeout, session.download(media)).await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                error!(tenant = %self.tenant, kind, "Failed to download media: {}", e);
                return None;
            }
            Err(_) => {
                error!(tenant = %self.tenant, kind, "Media download timed out");
                return None;
            }
        };

        let extension = extension_for(media.mime_type.as_deref(), media.file_name.as_deref());
        match self
            .ctx
            .artifacts
            .write_media(self.tenant, &message.info.id, &extension, &bytes)
            .await
        {
            Ok(path) => {
                info!(tenant = %self.tenant, kind, path = %path.display(), "Media saved");
                Some(path)
            }
            Err(e) => {
                error!(tenant = %self.tenant, kind, "Failed to save media: {}", e);
                None
            }
        }
    }

    async fn notify(&self, notification: Notification) {
        let tenant = self.tenant;
        let category = notification.category;

        let info = match self.ctx.cache.get_by_id(tenant).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                warn!(tenant = %tenant, "No tenant info, skipping webhook");
                return;
            }
            Err(e) => {
                warn!(tenant = %tenant, "Tenant lookup failed, skipping webhook: {}", e);
                return;
            }
        };

        if !info.subscriptions.allows(category) {
            debug!(tenant = %tenant, category = %category, "Not subscribed, skipping webhook");
            return;
        }

        if info.webhook_url.is_empty() {
            warn!(tenant = %tenant, "No webhook set for tenant");
            return;
        }

        let mut payload = json!({
            "event": notification.event,
            "type": category.as_str(),
        });
        if let Some(state) = notification.state {
            payload["state"] = json!(state);
        }

        let envelope = DispatchEnvelope {
            tenant,
            category,
            url: info.webhook_url,
            payload: payload.to_string(),
            artifact: notification.artifact,
        };
        if let Err(e) = self.ctx.webhooks.submit(envelope) {
            warn!(tenant = %tenant, category = %category, "Dropping webhook: {}", e);
        }
    }
}

#[async_trait]
impl EventSink for Dispatcher {
    async fn handle_event(&self, event: ProtocolEvent) {
        self.dispatch(event).await
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        error!("Failed to serialize event: {}", e);
        serde_json::Value::Null
    })
}
