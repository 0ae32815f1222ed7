//! # limiquantix Common
//!
//! Shared utilities for the limiquantix components.
//!
//! ## Logging
//!
//! ```no_run
//! use limiquantix_common::{init_logging_with_format, LogFormat};
//!
//! init_logging_with_format("info", LogFormat::Json).unwrap();
//! tracing::info!(context_id = 42, "Guest command sent");
//! ```

pub mod logging;

pub use logging::{init_logging, init_logging_json, init_logging_with_format, LogFormat};
