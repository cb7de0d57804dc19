//! Assistant API Core
//!
//! Shared plumbing for the assistant speech service:
//!
//! - Error type and `Result` alias used across crates
//! - YAML settings loading with `.env` support
//! - Logging setup (stderr + log file)
//!
//! # Example
//!
//! ```no_run
//! use assistant_core::*;
//!
//! fn main() -> Result<()> {
//!     let settings: LoggingSettings = load_yaml_config("/etc/assistant-api/config.yaml")?;
//!     let _guard = init_logging(&settings)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{load_env, load_yaml_config, DEFAULT_CONFIG_PATH};
pub use error::{AssistantError, Result};
pub use logging::{init_logging, LoggingSettings, DEFAULT_LOG_DIRECTORY, LOG_FILENAME};
