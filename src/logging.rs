//! Log setup. Standard output carries IPC frames, so records go to the
//! systemd journal on Linux and to a daily rolling file otherwise.

use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the log filter, e.g. `MEMORYVAULT_LOG=debug`.
pub const LOG_ENV: &str = "MEMORYVAULT_LOG";

const DEFAULT_FILTER: &str = "info";
const LOG_FILE_PREFIX: &str = "memoryvault.log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where log records end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    Journald,
    File(PathBuf),
}

impl fmt::Display for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSink::Journald => write!(f, "journald"),
            LogSink::File(dir) => write!(f, "{}", dir.join(LOG_FILE_PREFIX).display()),
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(log_dir: Option<PathBuf>) -> Result<LogSink> {
    let directives = std::env::var(LOG_ENV).ok();
    let registry = tracing_subscriber::registry().with(filter(directives.as_deref()));

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald) = tracing_journald::layer() {
            registry.with(journald).try_init()?;
            return Ok(LogSink::Journald);
        }
    }

    let dir = log_dir.unwrap_or_else(default_log_dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX));
    registry
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()?;
    let _ = FILE_GUARD.set(guard);

    Ok(LogSink::File(dir))
}

/// Filter from a directive string, falling back to `info` when it is
/// missing or does not parse.
fn filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("memoryvault")
        .join("logs")
}
