//! Application configuration module
//!
//! Provides the configuration types for the sync layer and a builder that
//! validates them. Configuration can also be read from a TOML file:
//!
//! ```toml
//! backend_url = "https://project.example.co"
//! api_key = "anon-key"
//! database_path = "/var/lib/tripsync/local.db"
//! demo_mode = false
//!
//! [sync]
//! sync_interval_seconds = 30
//! max_retry_attempts = 5
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the hosted backend
    pub backend_url: Option<String>,
    /// Anonymous API key sent with every backend request
    pub api_key: Option<String>,
    /// Location of the local SQLite database
    pub database_path: Option<String>,
    /// Use the in-process demo backend instead of the hosted one
    pub demo_mode: bool,
    /// Replay and retry tuning
    pub sync: SyncSettings,
}

/// Replay and retry tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Interval between background replay passes
    pub sync_interval_seconds: u64,
    /// Attempts before a queued operation is marked failed
    pub max_retry_attempts: u32,
    /// First backoff delay in milliseconds
    pub backoff_base_ms: u64,
    /// Upper bound for a single backoff delay in milliseconds
    pub backoff_max_ms: u64,
    /// Attempts for idempotent backend reads
    pub read_retry_attempts: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_interval_seconds: 30,
            max_retry_attempts: 5,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            read_retry_attempts: 3,
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.backend_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(url.clone()));
            }
        } else if !self.demo_mode {
            return Err(ConfigError::MissingValue("backend_url"));
        }

        if self.sync.max_retry_attempts == 0 {
            return Err(ConfigError::OutOfRange("sync.max_retry_attempts"));
        }
        if self.sync.backoff_base_ms > self.sync.backoff_max_ms {
            return Err(ConfigError::OutOfRange("sync.backoff_base_ms"));
        }
        Ok(())
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    backend_url: Option<String>,
    api_key: Option<String>,
    database_path: Option<String>,
    demo_mode: bool,
    sync: Option<SyncSettings>,
}

impl AppConfigBuilder {
    /// Set the backend URL
    pub fn backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    /// Set the API key
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the local database path
    pub fn database_path(mut self, path: impl Into<String>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Toggle demo mode
    pub fn demo_mode(mut self, enabled: bool) -> Self {
        self.demo_mode = enabled;
        self
    }

    /// Override replay and retry tuning
    pub fn sync(mut self, sync: SyncSettings) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let config = AppConfig {
            backend_url: self.backend_url,
            api_key: self.api_key,
            database_path: self.database_path,
            demo_mode: self.demo_mode,
            sync: self.sync.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("value out of range: {0}")]
    OutOfRange(&'static str),
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}
