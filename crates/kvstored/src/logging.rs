//! `tracing` initialization, mirroring the reference daemon's
//! `tracing_subscriber::fmt().with_env_filter(...)` setup, extended with an
//! optional non-blocking file appender for `--log-file`.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Guard that must be held for the lifetime of the process when logging to
/// a file — dropping it flushes the non-blocking writer's background thread.
pub enum LoggingGuard {
    Stderr,
    File(tracing_appender::non_blocking::WorkerGuard),
}

pub fn init(log_file: Option<&Path>) -> Result<LoggingGuard> {
    let filter = EnvFilter::from_default_env();

    match log_file {
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(LoggingGuard::Stderr)
        }
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(LoggingGuard::File(guard))
        }
    }
}
