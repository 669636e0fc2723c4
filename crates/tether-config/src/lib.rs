pub mod config;
pub mod manager;

pub use config::{
    Config, ConfigError, ConfigResult, LogLevel, LoggingConfig, ServerConfig, SessionsConfig,
    StorageConfig, WebhookConfig,
};
pub use manager::ConfigManager;

use std::path::PathBuf;

/// `~/.tether`
pub fn tether_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tether"))
}

pub fn default_config_path() -> Option<PathBuf> {
    tether_dir().map(|dir| dir.join("config.json"))
}

/// Create the data directory and its `files/` subdirectory
pub async fn init_data_dirs(config: &Config) -> ConfigResult<PathBuf> {
    let data_dir = expand_tilde(&config.sessions.data_dir)
        .ok_or_else(|| ConfigError::InvalidPath(config.sessions.data_dir.clone()))?;
    tokio::fs::create_dir_all(data_dir.join("files")).await?;
    Ok(data_dir)
}

/// Expand a leading `~/` to the home directory
pub fn expand_tilde(path: &str) -> Option<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir().map(|home| home.join(rest))
    } else {
        Some(PathBuf::from(path))
    }
}
