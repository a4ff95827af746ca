//! Logging setup.
//!
//! Events go to a daily rotating file under the local data directory, so
//! stdout carries only command output. `RUST_LOG` overrides the level.

use std::path::PathBuf;

use anyhow::Context;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "jiracli=info,warn";

const LOG_FILE_PREFIX: &str = "jiracli.log";

/// Install the global subscriber.
///
/// Fails when the log directory cannot be created or a subscriber is
/// already installed; callers treat that as non-fatal.
pub fn init() -> anyhow::Result<()> {
    let dir = log_directory().context("no local data directory for logs")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;

    let writer = RollingFileAppender::new(Rotation::DAILY, &dir, LOG_FILE_PREFIX);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true),
        )
        .with(filter)
        .try_init()?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), log_dir = %dir.display(), "jiracli started");
    Ok(())
}

/// `<local data dir>/jiracli/logs`.
pub fn log_directory() -> Option<PathBuf> {
    dirs::data_local_dir().map(|base| base.join("jiracli").join("logs"))
}
