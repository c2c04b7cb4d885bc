//! The command abstraction.
//!
//! A [`Command`] is registered once at startup and is immutable afterwards.
//! It declares the aliases that trigger it, the restriction chain that gates
//! it, whether it runs inline or on the asynchronous executor, and the body
//! itself.
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use herald_core::{Command, CommandResult, InvocationContext};
//!
//! struct Ping;
//!
//! #[async_trait]
//! impl Command<ChatMessage> for Ping {
//!     fn aliases(&self) -> Vec<String> {
//!         vec!["ping".into()]
//!     }
//!
//!     async fn execute(&self, ctx: &InvocationContext<ChatMessage>) -> CommandResult {
//!         ctx.message().reply("pong").await?;
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::InvocationContext;
use crate::error::CommandResult;
use crate::restriction::RestrictionChain;

/// A command that can be resolved from a message and executed.
#[async_trait]
pub trait Command<M>: Send + Sync {
    /// Human-readable identification used in diagnostics.
    ///
    /// Defaults to the implementing type's name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// The aliases that trigger this command.
    ///
    /// Must be non-empty and must not collide with any other registered
    /// command's aliases.
    fn aliases(&self) -> Vec<String>;

    /// Short description for help listings.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Usage line for help listings.
    fn usage(&self) -> Option<&str> {
        None
    }

    /// The restriction chain gating this command.
    ///
    /// Defaults to [`RestrictionChain::everyone`].
    fn restriction_chain(&self) -> &RestrictionChain {
        RestrictionChain::everyone_ref()
    }

    /// Whether the body runs on the asynchronous executor instead of inline.
    fn is_asynchronous(&self) -> bool {
        false
    }

    /// Runs the command body.
    async fn execute(&self, ctx: &InvocationContext<M>) -> CommandResult;
}

/// A shared, type-erased command.
pub type BoxedCommand<M> = Arc<dyn Command<M>>;
