//! Tether Gateway - per-tenant messaging session supervision
//!
//! Keeps one protocol session alive per tenant, drives pairing and
//! connection, and fans inbound protocol events out to each tenant's
//! webhook under its subscription filter.

pub mod artifacts;
pub mod cancel;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod protocol;
pub mod registry;
pub mod supervisor;
pub mod webhook;

pub use artifacts::{extension_for, ArtifactStore, CodeRenderer, RawCodeRenderer};
pub use cancel::CancelSignal;
pub use dispatcher::{DispatchContext, Dispatcher};
pub use error::{DeliveryError, DeliveryResult, ProtocolError, SessionError, SessionResult};
pub use event::ProtocolEvent;
pub use protocol::{
    EventSink, MediaAttachment, MediaKind, PairingEvent, ProtocolSession, SessionConnector,
};
pub use registry::{SessionEntry, SessionRegistry, SessionState};
pub use supervisor::{SessionStatus, Supervisor, SupervisorConfig};
pub use webhook::{DispatchEnvelope, HttpWebhookSender, WebhookQueue, WebhookSender, WebhookWorker};
