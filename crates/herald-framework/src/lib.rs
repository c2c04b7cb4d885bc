//! # Herald Framework
//!
//! The command resolution and dispatch pipeline.
//!
//! This layer provides:
//! - [`AliasRegistry`]: the combined alias matcher built once from all commands
//! - [`Dispatcher`]: the staged state machine with transformer hooks,
//!   fast-forwarding and restriction checks, also usable as a
//!   `tower::Service`
//! - [`ExecutorGateway`]: the lazily started runtime for asynchronous commands
//! - Convenience builders for closure commands ([`command`]), closure
//!   transformers ([`transformer_fn`]) and built-in restrictions
//!
//! Everything here is platform-agnostic; hosts supply messages, text and a
//! notification sink.

pub mod alias;
pub mod command;
pub mod dispatcher;
pub mod executor;
pub mod restrictions;
pub mod transformer;

pub use alias::{AliasMatch, AliasRegistry};
pub use command::{CommandBuilder, command};
pub use dispatcher::{DispatchOptions, DispatchOutcome, Dispatcher, DispatcherBuilder};
pub use executor::{ExecutorGateway, ExecutorOptions, ExecutorStats};
pub use restrictions::{Everyone, MatchCriterion, Nobody, Subject, SubjectRestriction};
pub use transformer::{PhaseTransformer, transformer_fn};
