//! Logging setup for the portcullis binary.
//!
//! The watch daemon logs twice: structured JSON into a daily-rotated file
//! under the state root, so admission decisions can be analyzed after the
//! fact, and human-readable lines on stderr for the operator terminal. The
//! one-shot `register` and `status` subcommands log to stderr only.

use std::io;
use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name prefix for rotated daemon logs.
const LOG_FILE_PREFIX: &str = "portcullis.log";

/// Keeps the background log writer alive.
///
/// Dropping the guard flushes buffered entries and closes the current log
/// file, so it must be held until the process exits.
pub struct LoggingGuard {
    _worker: WorkerGuard,
}

/// `RUST_LOG` when set, otherwise everything at `info` and up.
fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Set up logging for the long-running `watch` subcommand.
///
/// The JSON file layer rotates daily under `logs_dir` and carries every field
/// the monitor emits (container id, digest, `decision = "block"`); the stderr
/// layer mirrors the same events for whoever is watching the terminal.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created.
pub fn init_daemon(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let (file_writer, worker) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
        logs_dir,
        LOG_FILE_PREFIX,
    ));

    tracing_subscriber::registry()
        .with(default_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_writer(file_writer),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    Ok(LoggingGuard { _worker: worker })
}

/// Stderr-only logging for the one-shot subcommands. No file, no rotation.
pub fn init_cli() {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_writer(io::stderr)
        .init();
}
