//! Logging setup
//!
//! Console output in the compact format by default, JSON on request, and an
//! optional daily-rolling log file written off the hot path.

use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::MiddleClickError;

const LOG_FILE_PREFIX: &str = "middleclick.log";

/// Install the global subscriber
///
/// `RUST_LOG` overrides `level` when set. With `log_dir` the returned
/// guard must be kept alive until exit so buffered lines are flushed.
/// Installing twice is not an error; the second call is a no-op.
pub fn init_logging(
    level: &str,
    json: bool,
    log_dir: Option<PathBuf>,
) -> Result<Option<WorkerGuard>, MiddleClickError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| MiddleClickError::Config(format!("Invalid log level '{}': {}", level, e)))?;
    let registry = tracing_subscriber::registry().with(filter);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir).map_err(|e| {
                MiddleClickError::Config(format!("Failed to create log directory {:?}: {}", dir, e))
            })?;
            let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let installed = if json {
                registry.with(fmt::layer().json().with_writer(writer)).try_init()
            } else {
                registry
                    .with(
                        fmt::layer()
                            .with_thread_names(true)
                            .with_ansi(false)
                            .with_writer(writer),
                    )
                    .try_init()
            };
            if installed.is_err() {
                return Ok(None);
            }
            info!("Logging to {:?} (level={}, json={})", dir, level, json);
            Ok(Some(guard))
        }
        None => {
            let installed = if json {
                registry.with(fmt::layer().json()).try_init()
            } else {
                registry
                    .with(fmt::layer().with_target(false).compact())
                    .try_init()
            };
            if installed.is_ok() {
                info!("Logging initialized (level={})", level);
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_level() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(matches!(
            init_logging("middleclick=loud", false, None),
            Err(MiddleClickError::Config(_))
        ));
    }

    #[test]
    fn file_logging_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        // Another test may already own the global subscriber
        let _guard = init_logging("debug", false, Some(logs.clone())).unwrap();
        assert!(logs.is_dir());
    }
}
