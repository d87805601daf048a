use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};
use crate::shared::ids::UserId;

/// Default server URL
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

/// Environment variable overriding the REST server URL
pub const ENV_API_URL: &str = "NOTESYNC_API_URL";
/// Environment variable overriding the WebSocket URL
pub const ENV_WS_URL: &str = "NOTESYNC_WS_URL";
/// Environment variable overriding the signed-in user id
pub const ENV_USER_ID: &str = "NOTESYNC_USER_ID";

/// Client configuration wrapper.
///
/// Holds the validated [`AppConfig`] plus the bearer token handed over by the
/// session layer.
#[derive(Debug, Clone)]
pub struct Config {
    app: AppConfig,
    token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let mut app = AppConfig::default();
        app.server_url = Some(DEFAULT_SERVER_URL.to_string());
        Self { app, token: None }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_app(app: AppConfig) -> Self {
        Self { app, token: None }
    }

    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        Ok(Self::from_app(builder.build()?))
    }

    /// Load the config file (if any) and apply environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::from_app(AppConfig::load()?);
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `NOTESYNC_*` environment overrides on top of the current values
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            self.app.server_url = Some(url);
        }
        if let Ok(url) = std::env::var(ENV_WS_URL) {
            self.app.ws_url = Some(url);
        }
        if let Ok(raw) = std::env::var(ENV_USER_ID) {
            let id = uuid::Uuid::parse_str(raw.trim()).map_err(|e| ConfigError::InvalidValue {
                field: "user_id",
                message: e.to_string(),
            })?;
            self.app.user_id = Some(UserId::from(id));
        }
        self.app.validate()
    }

    /// Set the bearer token
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    /// Get the bearer token
    pub fn get_token(&self) -> Option<&String> {
        self.token.as_ref()
    }

    /// Clear the token (logout)
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// Get the full URL for a REST endpoint under `/api`
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.server_url().trim_end_matches('/'), path)
    }

    pub fn server_url(&self) -> &str {
        self.app.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }

    /// WebSocket endpoint for the push connection
    pub fn ws_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = self.app.websocket_url() {
            return Ok(url);
        }
        let mut fallback = self.app.clone();
        fallback.server_url = Some(self.server_url().to_string());
        fallback.websocket_url().ok_or(ConfigError::MissingValue("ws_url"))
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.app.user_id
    }

    pub fn set_user_id(&mut self, user_id: UserId) {
        self.app.user_id = Some(user_id);
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }
}
