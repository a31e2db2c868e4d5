//! Chantier Configuration Module
//!
//! Provides configuration file support via `chantier.toml`, environment
//! variables, and runtime overrides.
//!
//! # Priority (highest to lowest)
//!
//! 1. Environment variables (`CHANTIER_*`)
//! 2. Configuration file (`chantier.toml`)
//! 3. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration file.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Search configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Minimum Jaccard score for a candidate to be returned.
    /// The default keeps single-character-typo queries matching.
    pub default_min_score: f32,
    /// Maximum results per query.
    pub max_results: usize,
    /// Query timeout in milliseconds (0 = no deadline).
    pub query_timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_min_score: 0.3,
            max_results: 1000,
            query_timeout_ms: 30_000,
        }
    }
}

/// Trigram index configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Number of posting shards. Rounded up to a power of two.
    pub shard_count: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { shard_count: 16 }
    }
}

/// Access gateway configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Maximum age of the snapshot served to read-only principals,
    /// in milliseconds. Exceeding it forces a refresh.
    pub snapshot_staleness_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            snapshot_staleness_ms: 5_000,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace.
    pub level: String,
    /// Log format: text or json.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Main Chantier configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChantierConfig {
    /// Search configuration.
    pub search: SearchConfig,
    /// Trigram index configuration.
    pub index: IndexConfig,
    /// Access gateway configuration.
    pub gateway: GatewayConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl ChantierConfig {
    /// Loads configuration from default sources.
    ///
    /// Priority: defaults < file < environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("chantier.toml")
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CHANTIER_").split("_").lowercase(false));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Creates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.search.default_min_score) {
            return Err(ConfigError::InvalidValue {
                key: "search.default_min_score".to_string(),
                message: format!(
                    "must be in [0.0, 1.0], got {}",
                    self.search.default_min_score
                ),
            });
        }
        if self.search.max_results == 0 {
            return Err(ConfigError::InvalidValue {
                key: "search.max_results".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.index.shard_count == 0 {
            return Err(ConfigError::InvalidValue {
                key: "index.shard_count".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.gateway.snapshot_staleness_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "gateway.snapshot_staleness_ms".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!(
                    "must be one of {:?}, got '{}'",
                    valid_levels, self.logging.level
                ),
            });
        }
        Ok(())
    }
}
