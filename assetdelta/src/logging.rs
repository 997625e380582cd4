//! Tracing subscriber setup.
//!
//! Console output goes to stderr so stdout stays free for summaries. When a
//! log file is configured, a second non-blocking layer writes there too; the
//! returned [`LogGuard`] must be held until exit so buffered lines flush.

use std::path::Path;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset and no `-v` was given.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log file path has no file name component.
    #[error("invalid log file path {0}")]
    InvalidPath(String),

    /// The log directory could not be created.
    #[error("failed to create log directory {path}: {source}")]
    CreateDirFailed {
        path: String,
        source: std::io::Error,
    },

    /// The log file could not be opened.
    #[error("failed to open log file: {0}")]
    OpenFailed(String),

    /// A global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Keeps the file writer alive.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Map a `-v` count to a filter directive.
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => DEFAULT_LOG_LEVEL,
        1 => "debug",
        _ => "trace",
    }
}

fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `verbosity`. `log_file`, when given, receives the
/// same events without ANSI colouring.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> Result<LogGuard, LoggingError> {
    let filter = build_env_filter(level_for_verbosity(verbosity));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file_name = path
                .file_name()
                .ok_or_else(|| LoggingError::InvalidPath(path.display().to_string()))?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir).map_err(|e| LoggingError::CreateDirFailed {
                path: dir.display().to_string(),
                source: e,
            })?;

            let appender = rolling::Builder::new()
                .rotation(rolling::Rotation::NEVER)
                .filename_prefix(file_name.to_string_lossy().into_owned())
                .build(dir)
                .map_err(|e| LoggingError::OpenFailed(e.to_string()))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    Ok(LogGuard { _file: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_verbosity() {
        assert_eq!(level_for_verbosity(0), "info");
        assert_eq!(level_for_verbosity(1), "debug");
        assert_eq!(level_for_verbosity(5), "trace");
    }
}
