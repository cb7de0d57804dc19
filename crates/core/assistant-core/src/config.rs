//! Configuration loading: YAML settings files and environment variables

use crate::{AssistantError, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Default location of the service settings file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/assistant-api/config.yaml";

/// Load environment variables from a .env file
///
/// Safe to call when no .env file exists; only a malformed file is an error.
pub fn load_env() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::info!("Loaded environment from: {}", path.display());
            Ok(())
        }
        Err(dotenvy::Error::LineParse(line, pos)) => Err(AssistantError::config(format!(
            "Failed to parse .env file at line {}, position {}",
            line, pos
        ))),
        Err(dotenvy::Error::Io(_)) => {
            tracing::debug!("No .env file found - using system environment variables only");
            Ok(())
        }
        Err(e) => Err(AssistantError::config(format!(
            "Failed to load .env file: {}",
            e
        ))),
    }
}

/// Load a YAML settings file into `T`
///
/// A missing file, an empty document or a document whose root is not a
/// mapping all yield `T::default()`. A file that exists but cannot be read or
/// parsed is a configuration error.
pub fn load_yaml_config<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Settings file not found, using defaults");
        return Ok(T::default());
    }

    let raw = std::fs::read_to_string(path).map_err(|e| {
        AssistantError::config(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let value: serde_yaml::Value = serde_yaml::from_str(&raw).map_err(|e| {
        AssistantError::config(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    match value {
        serde_yaml::Value::Null => Ok(T::default()),
        serde_yaml::Value::Mapping(_) => serde_yaml::from_value(value).map_err(|e| {
            AssistantError::config(format!("Invalid settings in {}: {}", path.display(), e))
        }),
        _ => {
            tracing::warn!(path = %path.display(), "Settings root is not a mapping, using defaults");
            Ok(T::default())
        }
    }
}
