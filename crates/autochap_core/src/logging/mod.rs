//! Logging infrastructure.
//!
//! This module provides:
//! - Global `tracing` subscriber setup
//! - Per-run loggers with file + callback output
//! - Tail buffer for error diagnosis
//!
//! # Example
//!
//! ```no_run
//! use autochap_core::logging::{RunLogger, LogConfig};
//!
//! let logger = RunLogger::new("Show - 01", ".logs", LogConfig::default(), None).unwrap();
//! logger.phase("Match");
//! logger.success("Chapters written");
//! ```

mod run_logger;
mod types;

pub use run_logger::RunLogger;
pub use types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Honors `RUST_LOG`, falling back to `default_level`, and writes to stderr.
/// Should be called once at startup; later calls are ignored.
pub fn init_tracing(default_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false),
        )
        .with(filter)
        .try_init();
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
