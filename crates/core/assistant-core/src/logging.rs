//! Logging setup: stderr plus a plain-text log file

use crate::{AssistantError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directory for the service log file
pub const DEFAULT_LOG_DIRECTORY: &str = "/var/log/assistant-api";

/// File name of the service log inside the log directory
pub const LOG_FILENAME: &str = "assistant-api.log";

/// Logging section of the settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Directory that receives `assistant-api.log`
    pub directory: PathBuf,
    /// Filter used when `RUST_LOG` is not set (e.g. "info", "assistant=debug")
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_LOG_DIRECTORY),
            level: "info".to_string(),
        }
    }
}

impl LoggingSettings {
    /// Full path of the log file
    pub fn log_path(&self) -> PathBuf {
        self.directory.join(LOG_FILENAME)
    }
}

/// Initialize the global logging system
///
/// Creates the log directory if needed and installs an env-filtered
/// subscriber writing to stderr and to the log file. The returned guard must
/// be held for the lifetime of the process so buffered file output is flushed.
pub fn init_logging(settings: &LoggingSettings) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&settings.directory).map_err(|e| {
        AssistantError::config(format!(
            "Cannot create log directory {}: {}",
            settings.directory.display(),
            e
        ))
    })?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILENAME)
        .build(&settings.directory)
        .map_err(|e| AssistantError::config(format!("Cannot open log file: {}", e)))?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.as_str()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init()
        .map_err(|e| AssistantError::config(format!("Logging already initialized: {}", e)))?;

    Ok(guard)
}
