//! Configuration management for DonorStore
//!
//! This module provides environment-based configuration management with
//! support for defaults, TOML files and validation.

use crate::core_store::store::{AccessPolicy, StoreOptions};
use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session configuration
    pub session: SessionConfig,

    /// Store configuration
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Session configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Local peer identity; a random one is generated when absent
    pub peer_id: Option<String>,

    /// Directory for commit logs; stores are memory-only when absent
    pub data_dir: Option<PathBuf>,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store name
    pub name: String,

    /// Identities allowed to write, "*" for anyone
    pub write_access: Vec<String>,

    /// Heads announcement interval, zero disables it
    #[serde(with = "humantime_serde")]
    pub sync_interval: Duration,

    /// How long propagation of a local write may take before it is reported
    #[serde(with = "humantime_serde")]
    pub ack_timeout: Duration,

    /// Replication event buffer size
    pub event_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "donors".to_string(),
            write_access: vec!["*".to_string()],
            sync_interval: Duration::from_secs(30),
            ack_timeout: Duration::from_secs(5),
            event_capacity: 64,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl StoreConfig {
    /// Access policy described by `write_access`
    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy::from_write_list(&self.write_access)
    }
}

impl From<&StoreConfig> for StoreOptions {
    fn from(config: &StoreConfig) -> Self {
        StoreOptions {
            sync_interval: config.sync_interval,
            ack_timeout: config.ack_timeout,
            event_capacity: config.event_capacity,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: DONORSTORE_<SECTION>_<KEY>
    /// Example: DONORSTORE_STORE_NAME=donors
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Session config
        if let Ok(peer_id) = env::var("DONORSTORE_SESSION_PEER_ID") {
            config.session.peer_id = Some(peer_id);
        }
        if let Ok(data_dir) = env::var("DONORSTORE_SESSION_DATA_DIR") {
            config.session.data_dir = Some(PathBuf::from(data_dir));
        }

        // Store config
        if let Ok(name) = env::var("DONORSTORE_STORE_NAME") {
            config.store.name = name;
        }
        if let Ok(write) = env::var("DONORSTORE_STORE_WRITE_ACCESS") {
            config.store.write_access = write.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(interval) = env::var("DONORSTORE_STORE_SYNC_INTERVAL") {
            config.store.sync_interval = humantime::parse_duration(&interval)
                .map_err(|e| invalid_env("DONORSTORE_STORE_SYNC_INTERVAL", e))?;
        }
        if let Ok(timeout) = env::var("DONORSTORE_STORE_ACK_TIMEOUT") {
            config.store.ack_timeout = humantime::parse_duration(&timeout)
                .map_err(|e| invalid_env("DONORSTORE_STORE_ACK_TIMEOUT", e))?;
        }
        if let Ok(capacity) = env::var("DONORSTORE_STORE_EVENT_CAPACITY") {
            config.store.event_capacity = capacity
                .parse()
                .map_err(|e| invalid_env("DONORSTORE_STORE_EVENT_CAPACITY", e))?;
        }

        // Logging config
        if let Ok(level) = env::var("DONORSTORE_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = env::var("DONORSTORE_LOG_JSON") {
            config.logging.json_format = json
                .parse()
                .map_err(|e| invalid_env("DONORSTORE_LOG_JSON", e))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(peer_id) = &self.session.peer_id {
            if peer_id.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "peer_id must not be empty when set".to_string(),
                ));
            }
        }

        // Validate store config
        if self.store.name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("store name must not be empty".to_string()));
        }

        if self.store.write_access.iter().all(|w| w.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "write_access must list at least one identity or \"*\"".to_string(),
            ));
        }

        if self.store.ack_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "ack_timeout must be greater than 0".to_string(),
            ));
        }

        if self.store.event_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "event_capacity must be greater than 0".to_string(),
            ));
        }

        // Validate logging config
        if let Err(e) = self.logging.level.parse::<LogLevel>() {
            return Err(ConfigError::ValidationFailed(e.to_string()));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        let path = path.as_ref();
        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(())
    }
}

fn invalid_env(var: &'static str, err: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue { var, reason: err.to_string() }
}
