//! Application configuration module
//!
//! Provides the tunables of the sync core, a builder, validation and TOML
//! loading. Environment overrides and the bearer token live in
//! [`crate::client::Config`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::shared::ids::UserId;

/// Path of the STOMP WebSocket endpoint relative to the server URL
pub const DEFAULT_WS_PATH: &str = "/ws-chat/websocket";

/// Private sidebar destination; `{userId}` is substituted at subscribe time
pub const DEFAULT_SIDEBAR_DESTINATION: &str = "/user/{userId}/topic/sidebar";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// REST server URL (`http://host:port`)
    pub server_url: Option<String>,
    /// WebSocket URL; derived from `server_url` when absent
    pub ws_url: Option<String>,
    /// Signed-in user (needed for the private sidebar destination)
    pub user_id: Option<UserId>,
    /// Debounce window for note saves
    pub save_debounce_ms: u64,
    /// First reconnect delay
    pub reconnect_base_ms: u64,
    /// Reconnect delay ceiling
    pub reconnect_max_ms: u64,
    /// How long a "newly arrived" marker stays visible
    pub arrival_highlight_secs: u64,
    /// Per-request timeout for REST calls
    pub request_timeout_secs: u64,
    /// Sidebar destination template
    pub sidebar_destination: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            ws_url: None,
            user_id: None,
            save_debounce_ms: 1000,
            reconnect_base_ms: 1000,
            reconnect_max_ms: 30_000,
            arrival_highlight_secs: 40,
            request_timeout_secs: 30,
            sidebar_destination: DEFAULT_SIDEBAR_DESTINATION.to_string(),
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.server_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(url.clone()));
            }
        }
        if let Some(url) = &self.ws_url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(ConfigError::InvalidUrl(url.clone()));
            }
        }
        if self.save_debounce_ms == 0 {
            return Err(ConfigError::invalid("save_debounce_ms", "must be greater than zero"));
        }
        if self.reconnect_base_ms == 0 || self.reconnect_base_ms > self.reconnect_max_ms {
            return Err(ConfigError::invalid(
                "reconnect_base_ms",
                "must be non-zero and not exceed reconnect_max_ms",
            ));
        }
        if !self.sidebar_destination.starts_with('/') {
            return Err(ConfigError::invalid("sidebar_destination", "must start with '/'"));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// `<platform config dir>/notesync/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("notesync").join("config.toml"))
    }

    /// Load from the default path, falling back to defaults when the file does not exist
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// WebSocket URL, derived from the server URL when not set explicitly
    pub fn websocket_url(&self) -> Option<String> {
        if let Some(url) = &self.ws_url {
            return Some(url.clone());
        }
        let server = self.server_url.as_deref()?.trim_end_matches('/');
        let ws = if let Some(rest) = server.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = server.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            return None;
        };
        Some(format!("{}{}", ws, DEFAULT_WS_PATH))
    }

    /// Resolve the private sidebar destination for a user
    pub fn sidebar_destination_for(&self, user_id: UserId) -> String {
        self.sidebar_destination.replace("{userId}", &user_id.to_string())
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    pub fn arrival_highlight(&self) -> Duration {
        Duration::from_secs(self.arrival_highlight_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = Some(url.into());
        self
    }

    /// Set the WebSocket URL explicitly
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.config.ws_url = Some(url.into());
        self
    }

    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.config.user_id = Some(user_id);
        self
    }

    pub fn save_debounce(mut self, window: Duration) -> Self {
        self.config.save_debounce_ms = window.as_millis() as u64;
        self
    }

    pub fn reconnect(mut self, base: Duration, max: Duration) -> Self {
        self.config.reconnect_base_ms = base.as_millis() as u64;
        self.config.reconnect_max_ms = max.as_millis() as u64;
        self
    }

    pub fn arrival_highlight(mut self, duration: Duration) -> Self {
        self.config.arrival_highlight_secs = duration.as_secs();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_secs = timeout.as_secs();
        self
    }

    pub fn sidebar_destination(mut self, template: impl Into<String>) -> Self {
        self.config.sidebar_destination = template.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
    #[error("failed to read config: {0}")]
    Io(String),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}
