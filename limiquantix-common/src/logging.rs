//! Logging initialization using tracing.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log output format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Initialize the tracing subscriber with the specified log level.
///
/// `RUST_LOG` overrides `level` when set. Fails if a global subscriber is
/// already installed.
///
/// # Example
/// ```no_run
/// limiquantix_common::init_logging("info").unwrap();
/// ```
pub fn init_logging(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            fmt::layer()
                .with_timer(ChronoLocal::rfc_3339())
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}

/// Initialize logging with JSON output format.
/// Suitable for production environments with log aggregation.
pub fn init_logging_json(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            fmt::layer()
                .json()
                .with_timer(ChronoLocal::rfc_3339())
                .with_target(true)
                .with_thread_ids(true),
        )
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}

/// Initialize logging in the given format.
pub fn init_logging_with_format(level: &str, format: LogFormat) -> Result<()> {
    match format {
        LogFormat::Json => init_logging_json(level),
        LogFormat::Pretty => init_logging(level),
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
