//! Engine configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! max_conflict_retries = 5
//! notifications_enabled = true
//!
//! [logging]
//! level = "debug"
//! json = false
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Workflow engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Attempts made by `request_transition_with_retry` on version conflicts
    pub max_conflict_retries: u32,
    /// Emit transition events to the notification sink
    pub notifications_enabled: bool,
    /// Log output settings
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attempt limit for conflict retries
    #[inline]
    #[must_use]
    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Enable or disable transition events
    #[inline]
    #[must_use]
    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notifications_enabled = enabled;
        self
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    /// `Parse` on malformed TOML, `Invalid` when validation fails.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// `Io` when the file cannot be read, otherwise as [`Self::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// # Errors
    /// `Invalid` describing the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_conflict_retries == 0 {
            return Err(ConfigError::Invalid(
                "max_conflict_retries must be at least 1".to_string(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.level is empty".to_string()));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            notifications_enabled: true,
            logging: LoggingConfig::default(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
