//! Tether Server - HTTP surface for the session gateway
//!
//! Thin axum controllers over the [`tether_gateway::Supervisor`]: every
//! request is authenticated by tenant token, mapped onto a lifecycle
//! operation and answered with a `{code, success, data|error}` envelope.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod response;
pub mod server;
pub mod state;

pub use auth::AuthenticatedTenant;
pub use error::{ApiError, ServerError, ServerResult};
pub use logging::init_logging;
pub use server::{bootstrap, create_router, run_server, run_server_with_config};
pub use state::AppState;
