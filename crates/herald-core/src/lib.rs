//! # Herald Core
//!
//! Foundation types for the Herald command dispatch framework.
//!
//! Herald turns chat messages into command invocations. This crate holds the
//! platform-agnostic vocabulary shared by the dispatcher and by hosts:
//!
//! - **Invocation Context**: the per-message record refined by the pipeline
//!   ([`InvocationContext`])
//! - **Commands**: the executable unit and its metadata ([`Command`])
//! - **Restrictions**: named predicates composed into boolean chains
//!   ([`Restriction`], [`RestrictionChain`], [`RestrictionPolicy`])
//! - **Transformers**: per-phase hooks that may rewrite the context
//!   ([`ContextTransformer`], [`TransformPhase`])
//! - **Events**: not-found and not-allowed notifications ([`DispatchEvent`],
//!   [`EventSink`])
//! - **Errors**: the configuration and dispatch taxonomy ([`ConfigError`],
//!   [`DispatchError`])
//!
//! The dispatcher itself lives in `herald-framework`.

pub mod command;
pub mod context;
pub mod error;
pub mod event;
pub mod restriction;
pub mod transformer;

pub use command::{BoxedCommand, Command};
pub use context::{DataValue, InvocationContext, InvocationContextBuilder};
pub use error::{
    BoxError, CommandResult, ConfigError, ConfigResult, DispatchError, DispatchResult,
};
pub use event::{BoxedSink, DispatchEvent, EventSink, FnSink, sink_fn};
pub use restriction::{
    BoxedRestriction, EVERYONE, NOBODY, Restriction, RestrictionChain, RestrictionLookup,
    RestrictionPolicy,
};
pub use transformer::{BoxedTransformer, ContextTransformer, TransformPhase};

/// Re-exported so command implementations can use `#[async_trait]` without a
/// direct dependency.
pub use async_trait::async_trait;
