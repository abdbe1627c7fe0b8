use std::path::{Path, PathBuf};

use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};

const ENV_API_URL: &str = "TRIPSYNC_API_URL";
const ENV_API_KEY: &str = "TRIPSYNC_API_KEY";
const ENV_DB_PATH: &str = "TRIPSYNC_DB_PATH";
const ENV_DEMO_MODE: &str = "TRIPSYNC_DEMO_MODE";

/// Client configuration wrapper.
///
/// Holds the validated [`AppConfig`] plus the session token, which is never
/// persisted with the rest of the configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    token: Option<String>,
}

impl Config {
    /// Configuration from `TRIPSYNC_*` environment variables alone
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut app = AppConfig::default();
        apply_env_overrides(&mut app);
        app.validate()?;
        Ok(Self { app, token: None })
    }

    /// Read a TOML file, then let the environment override it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
        let mut app: AppConfig =
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        apply_env_overrides(&mut app);
        app.validate()?;
        Ok(Self { app, token: None })
    }

    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        let app = builder.build()?;
        Ok(Self { app, token: None })
    }

    /// Set the access token
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    /// Get the access token
    pub fn get_token(&self) -> Option<&String> {
        self.token.as_ref()
    }

    /// Clear the token (logout)
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// Get the full URL for a backend path
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.backend_url(), path)
    }

    pub fn backend_url(&self) -> &str {
        self.app.backend_url.as_deref().unwrap_or_default()
    }

    pub fn demo_mode(&self) -> bool {
        self.app.demo_mode
    }

    /// Local database location, defaulting to the user data directory
    pub fn database_path(&self) -> PathBuf {
        match &self.app.database_path {
            Some(path) => PathBuf::from(path),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tripsync")
                .join("local.db"),
        }
    }
}

fn apply_env_overrides(app: &mut AppConfig) {
    if let Ok(url) = std::env::var(ENV_API_URL) {
        app.backend_url = Some(url.trim_end_matches('/').to_string());
    }
    if let Ok(key) = std::env::var(ENV_API_KEY) {
        app.api_key = Some(key);
    }
    if let Ok(path) = std::env::var(ENV_DB_PATH) {
        app.database_path = Some(path);
    }
    if let Ok(flag) = std::env::var(ENV_DEMO_MODE) {
        app.demo_mode = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
    }
}
