//! Logging setup for the server.
//!
//! An interactive run logs to stderr. A detached run logs to systemd's
//! journal on Linux, falling back to a daily rolling file under the data
//! directory when journald is unavailable.

use anyhow::Result;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where log events end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Console,
    Journald,
    File,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("FACEMARK_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the logging system.
///
/// Log level is controlled via the `FACEMARK_LOG` environment variable
/// (`debug`, `info`, `warn`, `error`; default `info`).
pub fn init(log_dir: Option<PathBuf>) -> Result<LogTarget> {
    if std::io::stderr().is_terminal() {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
        return Ok(LogTarget::Console);
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(journald_layer)
                .init();

            tracing::info!("Logging initialized with journald backend");
            return Ok(LogTarget::Journald);
        }
    }

    let log_dir = log_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facemark")
            .join("logs")
    });

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "facemark.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The writer stops flushing once the guard drops.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    tracing::info!("Logging initialized with file backend at {:?}", log_dir);
    Ok(LogTarget::File)
}
