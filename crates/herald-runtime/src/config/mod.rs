//! Configuration module for the Herald runtime.
//!
//! Layered loading (defaults, files, environment, programmatic overrides)
//! through figment, plus validation of the resulting [`HeraldConfig`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigLoadError, ConfigLoadResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    DispatchConfig, ExecutorConfig, HeraldConfig, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, SpanEventConfig,
};
pub use validation::validate_config;
