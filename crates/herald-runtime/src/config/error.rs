//! Configuration loading error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading and validating configuration.
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    /// File not found at the specified path.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// A source could not be parsed or extracted into the schema.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {message}")]
    Validation { message: String },
}

impl ConfigLoadError {
    /// Creates a validation error with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

impl From<figment::Error> for ConfigLoadError {
    fn from(error: figment::Error) -> Self {
        Self::Parse(error.to_string())
    }
}

/// Result type for configuration loading.
pub type ConfigLoadResult<T> = Result<T, ConfigLoadError>;
