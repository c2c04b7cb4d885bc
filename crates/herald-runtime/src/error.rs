//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigLoadError;

/// Errors that can occur while composing or running a Herald host.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigLoadError),

    /// Registered commands, restrictions or transformers do not fit together.
    #[error("Invalid dispatcher setup: {0}")]
    Dispatch(#[from] herald_core::ConfigError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
