//! # rbdqemu Common
//!
//! Shared utilities for the rbdqemu crates.
//!
//! ## Logging
//!
//! ```rust,no_run
//! use rbdqemu_common::{init_logging_with_file, LogFileConfig};
//!
//! let _guard = init_logging_with_file("info", &LogFileConfig::new("provider.log")).unwrap();
//! tracing::info!(host = "192.168.3.100", "connecting");
//! ```

pub mod logging;
pub mod rotation;

pub use logging::{init_logging, init_logging_json, init_logging_with_file, LogFileConfig};
pub use rotation::{RotatingFile, DEFAULT_MAX_LOG_SIZE};
