//! Logging initialization using tracing.
//!
//! Console output always goes to stderr so that stdout stays reserved for the
//! machine-readable result of an operation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::rotation::{RotatingFile, DEFAULT_MAX_LOG_SIZE};

/// Where and how large the persistent log file may grow.
#[derive(Debug, Clone)]
pub struct LogFileConfig {
    /// Path of the live log file
    pub path: PathBuf,
    /// Rotate once the file exceeds this many bytes
    pub max_size_bytes: u64,
}

impl LogFileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_size_bytes: DEFAULT_MAX_LOG_SIZE,
        }
    }

    pub fn with_max_size(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the tracing subscriber with the specified log level.
///
/// # Arguments
/// * `level` - Log level string (trace, debug, info, warn, error)
///
/// # Example
/// ```
/// rbdqemu_common::init_logging("info").unwrap();
/// ```
pub fn init_logging(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(ChronoLocal::rfc_3339())
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Initialize logging to stderr plus a size-rotated log file.
///
/// Every file line carries an RFC 3339 timestamp and the emitting module, file
/// and line. The returned guard must be kept alive for the lifetime of the
/// process; dropping it flushes pending lines.
pub fn init_logging_with_file(level: &str, file: &LogFileConfig) -> Result<WorkerGuard> {
    let writer = RotatingFile::open(&file.path, file.max_size_bytes)
        .with_context(|| format!("Failed to open log file: {}", file.path.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(writer);

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(ChronoLocal::rfc_3339())
                .with_target(true),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_timer(ChronoLocal::rfc_3339())
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Initialize logging with JSON output format on stderr.
/// Suitable for environments that collect logs from the process.
pub fn init_logging_json(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}
