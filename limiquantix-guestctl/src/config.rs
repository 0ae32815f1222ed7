//! Configuration for the guest control layer.
//!
//! Loaded from YAML with defaults for every field:
//! - Linux: `/etc/quantix-kvm/guestctl.yaml`
//! - Windows: `C:\ProgramData\Quantix-KVM\guestctl.yaml`

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use limiquantix_common::LogFormat;

use crate::stream::{DEFAULT_GROW_INCREMENT, DEFAULT_MAX_RECORD_LEN};

/// Default configuration file path
#[cfg(unix)]
pub const DEFAULT_CONFIG_PATH: &str = "/etc/quantix-kvm/guestctl.yaml";

#[cfg(windows)]
pub const DEFAULT_CONFIG_PATH: &str = r"C:\ProgramData\Quantix-KVM\guestctl.yaml";

/// Upper bound for stream buffer sizes.
const MAX_STREAM_SIZE: usize = 16 * 1024 * 1024;

/// Guest control configuration loaded from YAML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestCtlConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log format (json, pretty)
    pub log_format: LogFormat,

    /// Timeout for guest command replies in milliseconds (0 = wait forever)
    pub default_wait_timeout_ms: u64,

    /// Stream reassembly limits
    pub stream: StreamConfig,
}

/// Limits applied to inbound guest streams
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Buffer growth granularity in bytes
    pub grow_increment: usize,

    /// Longest record accepted before the stream is treated as malformed
    pub max_record_len: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            grow_increment: DEFAULT_GROW_INCREMENT,
            max_record_len: DEFAULT_MAX_RECORD_LEN,
        }
    }
}

impl Default for GuestCtlConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            default_wait_timeout_ms: 30_000,
            stream: StreamConfig::default(),
        }
    }
}

impl GuestCtlConfig {
    /// Load configuration from the default path or fall back to defaults
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "Loaded configuration");
                    config
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to parse config file, using defaults"
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to read config file, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Save configuration to a file, creating parent directories
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "log_level".to_string(),
                message: format!("must be one of: {:?}", valid_levels),
            });
        }

        if self.stream.grow_increment == 0 || self.stream.grow_increment > MAX_STREAM_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "stream.grow_increment".to_string(),
                message: "must be between 1 byte and 16MB".to_string(),
            });
        }

        if self.stream.max_record_len == 0 || self.stream.max_record_len > MAX_STREAM_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "stream.max_record_len".to_string(),
                message: "must be between 1 byte and 16MB".to_string(),
            });
        }

        Ok(())
    }

    pub fn default_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.default_wait_timeout_ms)
    }

    /// Install the global tracing subscriber described by this configuration.
    pub fn init_logging(&self) -> anyhow::Result<()> {
        limiquantix_common::init_logging_with_format(&self.log_level, self.log_format)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
