//! Structured logging setup

use tether_config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ServerError, ServerResult};

/// Build the filter from `RUST_LOG` when set, else from the configured level
pub fn build_filter(config: &LoggingConfig, env: Option<&str>) -> ServerResult<EnvFilter> {
    let directives = env
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(config.level.as_str());
    EnvFilter::try_new(directives)
        .map_err(|e| ServerError::Logging(format!("Invalid log filter '{}': {}", directives, e)))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> ServerResult<()> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(config, env.as_deref())?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    result.map_err(|e| ServerError::Logging(e.to_string()))?;

    tracing::debug!(level = config.level.as_str(), json = config.json, "Logging initialized");
    Ok(())
}
