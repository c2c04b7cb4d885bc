//! # Herald
//!
//! A platform-agnostic command dispatch framework for chat bots.
//!
//! ## Overview
//!
//! Herald turns incoming chat messages into command invocations. A host
//! (a Discord, Matrix or IRC adapter, or just stdin) hands each message and
//! its text to a dispatcher, which recognises the prefix, finds the command
//! by alias, checks its restriction chain and runs it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐    ┌─────────────────────────────────────────────┐    ┌─────────┐
//! │   Host   │───▶│ Dispatcher                                  │───▶│ Command │
//! │ (adapter)│    │ prefix → alias/params → command → execution │    └─────────┘
//! └──────────┘    │   ▲ transformers before/after each phase    │    ┌─────────┐
//!                 └─────────────────────────────────────────────┘───▶│  Sinks  │
//!                                                                    └─────────┘
//! ```
//!
//! - **Core** (`herald-core`): context, command, restriction and event types
//! - **Framework** (`herald-framework`): alias registry, dispatcher, executor gateway
//! - **Runtime** (`herald-runtime`): configuration, logging, composition
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use herald::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = HeraldRuntime::<String>::new();
//!     runtime.register_command(
//!         command(["ping"]).handler(|_ctx| async {
//!             println!("pong");
//!             Ok(())
//!         }),
//!     );
//!
//!     let dispatcher = runtime.into_dispatcher()?;
//!     dispatcher.handle_message("alice".to_string(), "!ping").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: `herald.toml` configuration files
//! - `yaml-config`: `herald.yaml` configuration files
//! - `json-log`: JSON log output

pub use herald_core as core;
pub use herald_framework as framework;
pub use herald_runtime as runtime;

/// Commonly used types for building a bot.
///
/// ```rust,ignore
/// use herald::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use herald_runtime::{HeraldConfig, HeraldRuntime, Inbound, RuntimeError};

    // Dispatch
    pub use herald_framework::{
        DispatchOptions, DispatchOutcome, Dispatcher, DispatcherBuilder, command, transformer_fn,
    };

    // Restrictions
    pub use herald_core::{Restriction, RestrictionChain, RestrictionPolicy};
    pub use herald_framework::{Everyone, MatchCriterion, Nobody, Subject, SubjectRestriction};

    // Core traits and types for custom implementations
    pub use herald_core::{
        BoxError, BoxedCommand, Command, CommandResult, ContextTransformer, DispatchEvent,
        EventSink, InvocationContext, TransformPhase, async_trait, sink_fn,
    };
}
