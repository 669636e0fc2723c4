//! Inbound protocol events
//!
//! A closed set of event kinds with one variant per kind the gateway acts on
//! and an [`ProtocolEvent::Unknown`] fallback for everything else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::MediaAttachment;

/// App-state block whose sync completion triggers a presence announcement
pub const CRITICAL_BLOCK: &str = "critical_block";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ProtocolEvent {
    Connected,
    PushNameSetting,
    AppStateSyncComplete { name: String },
    PairSuccess(PairSuccess),
    StreamReplaced,
    Message(MessageEvent),
    Receipt(ReceiptEvent),
    Presence(PresenceEvent),
    ChatPresence(ChatPresenceEvent),
    HistorySync(HistorySyncEvent),
    AppState(AppStateEvent),
    LoggedOut(LoggedOutEvent),
    Call(CallEvent),
    Unknown {
        kind: String,
        #[serde(default)]
        raw: serde_json::Value,
    },
}

impl ProtocolEvent {
    /// Short name for logging
    pub fn kind(&self) -> &str {
        match self {
            ProtocolEvent::Connected => "connected",
            ProtocolEvent::PushNameSetting => "push_name_setting",
            ProtocolEvent::AppStateSyncComplete { .. } => "app_state_sync_complete",
            ProtocolEvent::PairSuccess(_) => "pair_success",
            ProtocolEvent::StreamReplaced => "stream_replaced",
            ProtocolEvent::Message(_) => "message",
            ProtocolEvent::Receipt(_) => "receipt",
            ProtocolEvent::Presence(_) => "presence",
            ProtocolEvent::ChatPresence(_) => "chat_presence",
            ProtocolEvent::HistorySync(_) => "history_sync",
            ProtocolEvent::AppState(_) => "app_state",
            ProtocolEvent::LoggedOut(_) => "logged_out",
            ProtocolEvent::Call(_) => "call",
            ProtocolEvent::Unknown { kind, .. } => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairSuccess {
    /// New device identity reference
    pub id: String,
    #[serde(default)]
    pub business_name: String,
    #[serde(default)]
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub id: String,
    pub chat: String,
    pub sender: String,
    #[serde(default)]
    pub push_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_from_me: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub info: MessageInfo,
    /// Protocol message content, passed through untouched
    #[serde(default)]
    pub message: serde_json::Value,
    #[serde(default)]
    pub is_view_once: bool,
    #[serde(default)]
    pub is_ephemeral: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptKind {
    Delivered,
    Read,
    ReadSelf,
    Played,
    Sender,
    Retry,
    Inactive,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptEvent {
    pub message_ids: Vec<String>,
    pub chat: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ReceiptKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub from: String,
    pub unavailable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPresenceEvent {
    pub chat: String,
    pub sender: String,
    /// `composing` or `paused`
    pub state: String,
    #[serde(default)]
    pub media: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySyncEvent {
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppStateEvent {
    pub index: Vec<String>,
    #[serde(default)]
    pub action: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedOutEvent {
    #[serde(default)]
    pub reason: String,
    /// Logged out while connecting rather than during the session
    #[serde(default)]
    pub on_connect: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    Offer,
    Accept,
    Terminate,
    OfferNotice,
    RelayLatency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEvent {
    pub phase: CallPhase,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub call_id: String,
}
