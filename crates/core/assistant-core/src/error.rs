//! Error types for the assistant core

use thiserror::Error;

/// Main error type for assistant operations
#[derive(Debug, Error)]
pub enum AssistantError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Service error (engines, codecs, streaming)
    #[error("Service error: {0}")]
    Service(String),
}

/// Convenient Result type using AssistantError
pub type Result<T> = std::result::Result<T, AssistantError>;

impl AssistantError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        AssistantError::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        AssistantError::Validation(msg.into())
    }

    /// Create a service error
    pub fn service(msg: impl Into<String>) -> Self {
        AssistantError::Service(msg.into())
    }
}
