//! # Tenant Types
//!
//! Tenant records as persisted, the event category set and the subscription
//! list that filters outbound notifications.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Tenant identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub u64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TenantId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Notification category a tenant can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    Message,
    ReadReceipt,
    Presence,
    HistorySync,
    ChatPresence,
    /// Sentinel matching every category
    All,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Message => "Message",
            EventCategory::ReadReceipt => "ReadReceipt",
            EventCategory::Presence => "Presence",
            EventCategory::HistorySync => "HistorySync",
            EventCategory::ChatPresence => "ChatPresence",
            EventCategory::All => "All",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised category name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event category: {}", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for EventCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Message" => Ok(EventCategory::Message),
            "ReadReceipt" => Ok(EventCategory::ReadReceipt),
            "Presence" => Ok(EventCategory::Presence),
            "HistorySync" => Ok(EventCategory::HistorySync),
            "ChatPresence" => Ok(EventCategory::ChatPresence),
            "All" => Ok(EventCategory::All),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// Ordered, duplicate-free list of subscribed categories
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subscriptions(Vec<EventCategory>);

impl Subscriptions {
    pub fn all() -> Self {
        Self(vec![EventCategory::All])
    }

    /// Normalise a requested list.
    ///
    /// An empty request subscribes to everything. Unknown names are dropped
    /// with a warning and duplicates keep their first position.
    pub fn normalize<S: AsRef<str>>(requested: &[S]) -> Self {
        if requested.is_empty() {
            return Self::all();
        }

        let mut categories = Vec::with_capacity(requested.len());
        for name in requested {
            let name = name.as_ref().trim();
            match name.parse::<EventCategory>() {
                Ok(category) => {
                    if !categories.contains(&category) {
                        categories.push(category);
                    }
                }
                Err(e) => warn!("Discarding subscription: {}", e),
            }
        }
        Self(categories)
    }

    /// Parse the comma-joined stored form; an empty string means no categories
    pub fn from_stored(stored: &str) -> Self {
        let names: Vec<&str> = stored
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if names.is_empty() {
            return Self::default();
        }
        Self::normalize(&names)
    }

    pub fn to_stored(&self) -> String {
        self.0
            .iter()
            .map(EventCategory::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// True if `category` is listed or the list holds `All`
    pub fn allows(&self, category: EventCategory) -> bool {
        self.0
            .iter()
            .any(|c| *c == category || *c == EventCategory::All)
    }

    pub fn categories(&self) -> &[EventCategory] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Persisted tenant row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: TenantId,
    pub token: String,
    /// Device identity reference, present once paired
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(default)]
    pub webhook_url: String,
    /// Comma-joined category names
    #[serde(default)]
    pub events: String,
    /// Was connected at last shutdown
    #[serde(default)]
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairing_code: Option<String>,
}

impl TenantRecord {
    pub fn new(id: u64, token: impl Into<String>) -> Self {
        Self {
            id: TenantId(id),
            token: token.into(),
            identity: None,
            webhook_url: String::new(),
            events: String::new(),
            connected: false,
            pairing_code: None,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_webhook(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = url.into();
        self
    }

    pub fn with_connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }

    pub fn subscriptions(&self) -> Subscriptions {
        Subscriptions::from_stored(&self.events)
    }

    pub fn apply(&mut self, patch: TenantPatch) {
        match patch {
            TenantPatch::Webhook(url) => self.webhook_url = url,
            TenantPatch::Events(events) => self.events = events,
            TenantPatch::Identity(identity) => self.identity = identity,
            TenantPatch::Connected(connected) => self.connected = connected,
            TenantPatch::PairingCode(code) => self.pairing_code = code,
        }
    }
}

/// Single-column update
#[derive(Debug, Clone, PartialEq)]
pub enum TenantPatch {
    Webhook(String),
    Events(String),
    Identity(Option<String>),
    Connected(bool),
    PairingCode(Option<String>),
}

/// Hot-path view of a tenant held by the info cache
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantInfo {
    pub id: TenantId,
    pub token: String,
    pub identity: Option<String>,
    pub webhook_url: String,
    pub subscriptions: Subscriptions,
}

impl From<&TenantRecord> for TenantInfo {
    fn from(record: &TenantRecord) -> Self {
        Self {
            id: record.id,
            token: record.token.clone(),
            identity: record.identity.clone(),
            webhook_url: record.webhook_url.clone(),
            subscriptions: record.subscriptions(),
        }
    }
}
