//! Outbound dispatch notifications.
//!
//! "Command not found" and "command not allowed" are ordinary outcomes. The
//! dispatcher reports them by publishing a [`DispatchEvent`] to every
//! registered [`EventSink`] and moving on; it never waits for delivery.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::context::InvocationContext;

/// A notification emitted when a dispatch terminates without executing.
pub enum DispatchEvent<M> {
    /// The prefix matched but no command could be resolved.
    CommandNotFound(InvocationContext<M>),
    /// A command was resolved but its restriction chain rejected the invocation.
    CommandNotAllowed(InvocationContext<M>),
}

impl<M> DispatchEvent<M> {
    /// Returns the context the dispatch ended with.
    pub fn context(&self) -> &InvocationContext<M> {
        match self {
            Self::CommandNotFound(ctx) | Self::CommandNotAllowed(ctx) => ctx,
        }
    }

    /// Consumes the event, returning its context.
    pub fn into_context(self) -> InvocationContext<M> {
        match self {
            Self::CommandNotFound(ctx) | Self::CommandNotAllowed(ctx) => ctx,
        }
    }

    /// Returns a short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CommandNotFound(_) => "command_not_found",
            Self::CommandNotAllowed(_) => "command_not_allowed",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::CommandNotFound(_))
    }

    pub fn is_not_allowed(&self) -> bool {
        matches!(self, Self::CommandNotAllowed(_))
    }
}

impl<M> Clone for DispatchEvent<M> {
    fn clone(&self) -> Self {
        match self {
            Self::CommandNotFound(ctx) => Self::CommandNotFound(ctx.clone()),
            Self::CommandNotAllowed(ctx) => Self::CommandNotAllowed(ctx.clone()),
        }
    }
}

impl<M> fmt::Debug for DispatchEvent<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(match self {
            Self::CommandNotFound(_) => "CommandNotFound",
            Self::CommandNotAllowed(_) => "CommandNotAllowed",
        })
        .field(self.context())
        .finish()
    }
}

// =============================================================================
// EventSink
// =============================================================================

/// Receiver of dispatch notifications supplied by the hosting application.
///
/// `publish` is called on the dispatching task and must not block. Delivery
/// failures are the sink's own concern.
pub trait EventSink<M>: Send + Sync {
    fn publish(&self, event: DispatchEvent<M>);
}

/// A shared, type-erased sink.
pub type BoxedSink<M> = Arc<dyn EventSink<M>>;

impl<M: Send + Sync> EventSink<M> for mpsc::UnboundedSender<DispatchEvent<M>> {
    fn publish(&self, event: DispatchEvent<M>) {
        if let Err(mpsc::error::SendError(event)) = self.send(event) {
            trace!(
                kind = event.kind(),
                "Event receiver dropped, notification discarded"
            );
        }
    }
}

/// Sink backed by a closure.
///
/// The closure runs inline on the dispatching task, so `handle` does not
/// return until it does. Keep it short: forward to a channel or
/// `tokio::spawn` anything slow.
pub struct FnSink<F>(F);

impl<M, F> EventSink<M> for FnSink<F>
where
    F: Fn(DispatchEvent<M>) + Send + Sync,
{
    fn publish(&self, event: DispatchEvent<M>) {
        (self.0)(event)
    }
}

/// Wraps a closure as an [`EventSink`].
///
/// The closure is called synchronously on the dispatching task and must not
/// block. For slow delivery use an [`mpsc::UnboundedSender`] sink or spawn
/// from inside the closure.
pub fn sink_fn<M, F>(f: F) -> FnSink<F>
where
    F: Fn(DispatchEvent<M>) + Send + Sync,
{
    FnSink(f)
}
