//! Herald Runtime - composition layer for the Herald command framework.
//!
//! This crate provides:
//! - Layered configuration loading and validation (`config`)
//! - Logging setup driven by that configuration (`logging`)
//! - [`HeraldRuntime`], which turns configuration plus registered commands,
//!   restrictions, transformers and sinks into a running dispatcher
//!
//! ```rust,ignore
//! use herald_runtime::{HeraldRuntime, Inbound};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = HeraldRuntime::<ChatMessage>::new();
//!     runtime.register_command(ping_command());
//!
//!     let (tx, rx) = tokio::sync::mpsc::channel(64);
//!     spawn_platform_reader(tx);
//!
//!     runtime.run(rx).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    ConfigLoadError, ConfigLoadResult, ConfigLoader, DispatchConfig, ExecutorConfig,
    HeraldConfig, LoggingConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{HeraldRuntime, Inbound, RuntimeBuilder};
pub use tokio_util::sync::CancellationToken;

// Re-export tracing for use by hosts
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for hosts.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
