use serde::{Deserialize, Serialize};

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            server: ServerConfig::default(),
            sessions: SessionsConfig::default(),
            webhook: WebhookConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Read a single value by dotted key, e.g. `webhook.timeout_secs`
    pub fn get_value(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["version"] => Some(self.version.clone()),
            ["server", "port"] => Some(self.server.port.to_string()),
            ["server", "host"] => Some(self.server.host.clone()),
            ["sessions", "connect_wait_secs"] => Some(self.sessions.connect_wait_secs.to_string()),
            ["sessions", "resume_on_startup"] => Some(self.sessions.resume_on_startup.to_string()),
            ["sessions", "data_dir"] => Some(self.sessions.data_dir.clone()),
            ["sessions", "media_download_timeout_secs"] => {
                Some(self.sessions.media_download_timeout_secs.to_string())
            }
            ["sessions", "max_media_downloads"] => {
                Some(self.sessions.max_media_downloads.to_string())
            }
            ["webhook", "timeout_secs"] => Some(self.webhook.timeout_secs.to_string()),
            ["webhook", "max_redirects"] => Some(self.webhook.max_redirects.to_string()),
            ["webhook", "accept_invalid_certs"] => Some(self.webhook.accept_invalid_certs.to_string()),
            ["webhook", "queue_capacity"] => Some(self.webhook.queue_capacity.to_string()),
            ["webhook", "max_in_flight"] => Some(self.webhook.max_in_flight.to_string()),
            ["storage", "path"] => Some(self.storage.path.clone()),
            ["logging", "level"] => Some(self.logging.level.as_str().to_string()),
            ["logging", "json"] => Some(self.logging.json.to_string()),
            _ => None,
        }
    }

    /// Set a single value by dotted key
    pub fn set_value(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["server", "port"] => self.server.port = parse_number(value)?,
            ["server", "host"] => self.server.host = value.to_string(),
            ["sessions", "connect_wait_secs"] => {
                self.sessions.connect_wait_secs = parse_number(value)?
            }
            ["sessions", "resume_on_startup"] => {
                self.sessions.resume_on_startup = parse_bool(value)?
            }
            ["sessions", "data_dir"] => self.sessions.data_dir = value.to_string(),
            ["sessions", "media_download_timeout_secs"] => {
                self.sessions.media_download_timeout_secs = parse_number(value)?
            }
            ["sessions", "max_media_downloads"] => {
                self.sessions.max_media_downloads = parse_number(value)?
            }
            ["webhook", "timeout_secs"] => self.webhook.timeout_secs = parse_number(value)?,
            ["webhook", "max_redirects"] => self.webhook.max_redirects = parse_number(value)?,
            ["webhook", "accept_invalid_certs"] => {
                self.webhook.accept_invalid_certs = parse_bool(value)?
            }
            ["webhook", "queue_capacity"] => self.webhook.queue_capacity = parse_number(value)?,
            ["webhook", "max_in_flight"] => self.webhook.max_in_flight = parse_number(value)?,
            ["storage", "path"] => self.storage.path = value.to_string(),
            ["logging", "level"] => self.logging.level = value.parse()?,
            ["logging", "json"] => self.logging.json = parse_bool(value)?,
            _ => return Err(ConfigError::KeyNotFound(key.to_string())),
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(value: &str) -> ConfigResult<T> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("Invalid number: {}", value)))
}

fn parse_bool(value: &str) -> ConfigResult<bool> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("Invalid boolean: {}", value)))
}

/// HTTP API listener
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
        }
    }
}

/// Session lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionsConfig {
    /// How long a synchronous start waits for the transport to come up
    pub connect_wait_secs: u64,
    /// Restart every tenant that was connected at last shutdown
    pub resume_on_startup: bool,
    /// Root for per-tenant artifact directories (`<data_dir>/files/user_<id>`)
    pub data_dir: String,
    #[serde(default = "default_media_download_timeout")]
    pub media_download_timeout_secs: u64,
    /// Media downloads running at once across all tenants
    #[serde(default = "default_max_media_downloads")]
    pub max_media_downloads: usize,
}

fn default_media_download_timeout() -> u64 {
    30
}

fn default_max_media_downloads() -> usize {
    16
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            connect_wait_secs: 10,
            resume_on_startup: true,
            data_dir: "~/.tether".to_string(),
            media_download_timeout_secs: default_media_download_timeout(),
            max_media_downloads: default_max_media_downloads(),
        }
    }
}

/// Outbound webhook delivery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookConfig {
    pub timeout_secs: u64,
    pub max_redirects: usize,
    /// Skip TLS certificate verification for callback endpoints
    pub accept_invalid_certs: bool,
    /// Envelopes waiting for a delivery slot; overflow is dropped
    pub queue_capacity: usize,
    /// Concurrent outbound calls
    pub max_in_flight: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            max_redirects: 15,
            accept_invalid_certs: true,
            queue_capacity: 1024,
            max_in_flight: 64,
        }
    }
}

/// Tenant record store location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "~/.tether/tenants.json".to_string(),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ConfigError::Validation(format!("Invalid log level: {}", s))),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.sessions.connect_wait_secs, 10);
        assert_eq!(config.webhook.timeout_secs, 5);
        assert_eq!(config.webhook.max_redirects, 15);
    }

    #[test]
    fn test_get_and_set_value() {
        let mut config = Config::default();
        config.set_value("webhook.max_in_flight", "8").unwrap();
        config.set_value("logging.level", "debug").unwrap();
        assert_eq!(config.get_value("webhook.max_in_flight").as_deref(), Some("8"));
        assert_eq!(config.get_value("logging.level").as_deref(), Some("debug"));

        assert!(config.set_value("webhook.max_in_flight", "many").is_err());
        assert!(matches!(
            config.set_value("nope.nothing", "1"),
            Err(ConfigError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let config: Config = serde_json::from_str(r#"{"version": "0.1.0"}"#).unwrap();
        assert_eq!(config.webhook, WebhookConfig::default());
        assert_eq!(config.logging.level, LogLevel::Info);
    }
}
