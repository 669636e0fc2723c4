//! Protocol session boundary
//!
//! The messaging-network client is an external collaborator. The gateway only
//! sees it through [`ProtocolSession`], obtained per tenant from a
//! [`SessionConnector`], and hands it an [`EventSink`] to deliver inbound events.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tether_store::TenantId;
use tokio::sync::mpsc;

use crate::error::ProtocolError;
use crate::event::ProtocolEvent;

/// Events on the pairing stream of an unpaired session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// A fresh code to show to the user
    Code(String),
    /// No code was scanned in time
    Timeout,
    Success,
    /// Anything else the client reports (errors, unexpected states)
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Audio,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
        }
    }
}

/// Downloadable content attached to a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Opaque locator the protocol client resolves on download
    pub locator: String,
}

/// One live connection to the messaging network for one tenant
#[async_trait]
pub trait ProtocolSession: Send + Sync {
    async fn connect(&self) -> Result<(), ProtocolError>;

    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// True once the device identity is bound
    fn is_paired(&self) -> bool;

    /// Unbind the device identity on the network side
    async fn logout(&self) -> Result<(), ProtocolError>;

    /// Pairing stream; must be requested before `connect` on an unpaired session
    async fn pairing_events(&self) -> Result<mpsc::Receiver<PairingEvent>, ProtocolError>;

    /// Install the handler invoked for every inbound event, serially
    fn set_event_sink(&self, sink: Arc<dyn EventSink>);

    async fn download(&self, media: &MediaAttachment) -> Result<Vec<u8>, ProtocolError>;

    /// Display name of the logged-in account, if known
    fn push_name(&self) -> Option<String>;

    async fn send_presence_available(&self) -> Result<(), ProtocolError>;
}

/// Builds protocol sessions
pub trait SessionConnector: Send + Sync {
    fn open(
        &self,
        tenant: TenantId,
        identity: Option<&str>,
    ) -> Result<Arc<dyn ProtocolSession>, ProtocolError>;
}

/// Receives every inbound protocol event for one tenant
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn handle_event(&self, event: ProtocolEvent);
}
