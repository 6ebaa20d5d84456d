//! Application configuration.
//!
//! Loaded from an optional TOML file, then overridden from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `DURABLE_TIMER_DATA_DIR` | `data_dir` |
//! | `DURABLE_TIMER_LOG` | `log_filter` |
//! | `DURABLE_TIMER_SNAPSHOT_EVERY` | `registry.snapshot_every` |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use timer_actors::RegistryConfig;

/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "DURABLE_TIMER_DATA_DIR";
/// Environment variable overriding the log filter.
pub const ENV_LOG: &str = "DURABLE_TIMER_LOG";
/// Environment variable overriding the snapshot cadence.
pub const ENV_SNAPSHOT_EVERY: &str = "DURABLE_TIMER_SNAPSHOT_EVERY";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// An environment override has an unusable value.
    #[error("Invalid value '{value}' for {var}")]
    InvalidEnv { var: String, value: String },
}

/// Top-level configuration of the `durable-timer` binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding timer journals and snapshots.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Tracing filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Timer registry settings.
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_filter: default_log_filter(),
            registry: RegistryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path` (or defaults when `None`), then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an
    /// override is malformed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env(|var| std::env::var(var).ok())
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the parser's message if the text does not match the schema.
    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Apply overrides looked up through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cadence is not a number.
    pub fn with_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(filter) = lookup(ENV_LOG) {
            self.log_filter = filter;
        }

        if let Some(value) = lookup(ENV_SNAPSHOT_EVERY) {
            self.registry.snapshot_every =
                value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    var: ENV_SNAPSHOT_EVERY.to_string(),
                    value,
                })?;
        }

        Ok(self)
    }

    /// Replace the data directory when `dir` is set.
    #[must_use]
    pub fn with_data_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.data_dir = dir;
        }
        self
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".durable-timer/data")
}

fn default_log_filter() -> String {
    "info".to_string()
}
