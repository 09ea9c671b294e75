//! Configuration module for iio-core
//!
//! Settings that shape how a context talks to its backend: the transfer
//! deadline, the largest attribute block accepted from a batch exchange and
//! the default log filter of the `iio-info` tool.
//!
//! # Config Location
//!
//! The default file lives in the platform configuration directory:
//! - **Linux**: `~/.config/iio-core/config.toml`
//! - **macOS**: `~/Library/Application Support/iio-core/config.toml`
//! - **Windows**: `%APPDATA%\iio-core\config.toml`
//!
//! Files ending in `.toml` are TOML; anything else is read as JSON.
//!
//! # Example
//!
//! ```ignore
//! use iio_core::config::ContextConfig;
//!
//! let config = ContextConfig::load_or_default(ContextConfig::default_path().unwrap());
//! let ctx = Context::with_config(backend, &config)?;
//! ```

use crate::error::{IioError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for the config directory
pub const APP_ID: &str = "iio-core";

/// Default config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Default transfer deadline in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default limit on a single attribute block (1 MiB)
pub const DEFAULT_MAX_BATCH_BYTES: usize = 1024 * 1024;

/// Default tracing filter
pub const DEFAULT_LOG_FILTER: &str = "info,iio_core=debug";

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_batch_bytes() -> usize {
    DEFAULT_MAX_BATCH_BYTES
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Context configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Deadline for blocking transfers, in milliseconds (0 waits forever)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Largest attribute block accepted from a batch exchange
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,

    /// Tracing filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ContextConfig {
    /// Set the transfer deadline
    ///
    /// Durations too long to count in milliseconds mean no deadline. A
    /// non-zero deadline shorter than a millisecond rounds up to one.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = if timeout.is_zero() {
            0
        } else {
            u64::try_from(timeout.as_millis()).map_or(0, |ms| ms.max(1))
        };
        self
    }

    /// Set the batch block limit
    pub fn with_max_batch_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_bytes = bytes;
        self
    }

    /// Transfer deadline; a zero value means no deadline
    pub fn timeout(&self) -> Duration {
        if self.timeout_ms == 0 {
            Duration::MAX
        } else {
            Duration::from_millis(self.timeout_ms)
        }
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
    }

    /// Load a config file; TOML for `.toml` files, JSON otherwise
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            IioError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        if is_toml(path) {
            toml::from_str(&content).map_err(|e| {
                IioError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })
        } else {
            serde_json::from_str(&content).map_err(|e| {
                IioError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })
        }
    }

    /// Load a config file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config; TOML for `.toml` files, JSON otherwise
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                IioError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = if is_toml(path) {
            toml::to_string_pretty(self)
                .map_err(|e| IioError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            serde_json::to_string_pretty(self)
                .map_err(|e| IioError::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content).map_err(|e| {
            IioError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}
