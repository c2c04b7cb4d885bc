//! Error types for the Herald dispatch core.
//!
//! Two families live here:
//!
//! - [`ConfigError`]: wiring defects (duplicate aliases, missing restrictions,
//!   misregistered transformers). These are fatal and never retried.
//! - [`DispatchError`]: everything that can escape `Dispatcher::handle` to the
//!   caller, i.e. configuration errors discovered on first use, synchronous
//!   command failures, and executor rejection.
//!
//! "Command not found" and "command not allowed" are *not* errors; they are
//! ordinary outcomes reported through [`DispatchEvent`](crate::DispatchEvent).

use thiserror::Error;

use crate::transformer::TransformPhase;

/// Boxed error type returned by command bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Configuration Errors
// =============================================================================

/// A defect in how commands, restrictions or transformers were wired together.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Two commands registered the same alias.
    #[error("alias '{alias}' is registered by both '{first}' and '{second}'")]
    DuplicateAlias {
        /// The conflicting alias.
        alias: String,
        /// The command that registered the alias first.
        first: String,
        /// The command that tried to register it again.
        second: String,
    },

    /// A command declared no aliases at all.
    #[error("command '{command}' declares no aliases")]
    EmptyAliases {
        /// The offending command.
        command: String,
    },

    /// A command declared an alias that can never match.
    #[error("command '{command}' declares an invalid alias {alias:?}")]
    InvalidAlias {
        /// The offending command.
        command: String,
        /// The rejected alias.
        alias: String,
    },

    /// A restriction chain referenced an identifier with no registered predicate.
    #[error("restriction '{id}' is not registered (known restrictions: {known:?})")]
    MissingRestriction {
        /// The identifier that could not be resolved.
        id: String,
        /// Every identifier in the lookup table at the time of evaluation.
        known: Vec<String>,
    },

    /// The same restriction identifier was registered twice.
    #[error("restriction '{id}' is registered more than once")]
    DuplicateRestriction {
        /// The duplicated identifier.
        id: String,
    },

    /// More than one transformer was bound to a phase slot.
    #[error("more than one transformer registered for phase {phase}")]
    DuplicateTransformer {
        /// The contested slot.
        phase: TransformPhase,
    },

    /// A transformer was invoked for a phase it was not written for.
    #[error("transformer for phase {expected} invoked in phase {got}")]
    UnexpectedPhase {
        /// The phase the transformer handles.
        expected: TransformPhase,
        /// The phase it was actually invoked with.
        got: TransformPhase,
    },

    /// A restriction policy was applied to an empty identifier list.
    #[error("restriction policy {policy} requires at least one restriction")]
    EmptyRestrictionPolicy {
        /// Name of the policy.
        policy: &'static str,
    },

    /// A matching criterion was constructed from invalid input.
    #[error("invalid criterion: {0}")]
    InvalidCriterion(String),

    /// A regular expression failed to compile.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The source pattern.
        pattern: String,
        /// Compiler diagnostic.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an invalid criterion error.
    pub fn invalid_criterion(msg: impl Into<String>) -> Self {
        Self::InvalidCriterion(msg.into())
    }

    /// Creates an invalid pattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.to_string(),
        }
    }
}

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Errors that propagate out of a dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A wiring defect surfaced while processing a message.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A synchronous command body returned an error.
    #[error("command '{command}' failed: {source}")]
    Command {
        /// Name of the failing command.
        command: String,
        /// The error returned by the command body.
        #[source]
        source: BoxError,
    },

    /// The asynchronous executor could not be started.
    #[error("failed to start command executor: {0}")]
    ExecutorUnavailable(#[source] std::io::Error),

    /// The asynchronous executor has been shut down and accepts no new work.
    #[error("command executor is shut down")]
    ExecutorShutdown,
}

impl DispatchError {
    /// Returns `true` if this error is a wiring defect.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for configuration checks.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type returned by command bodies.
pub type CommandResult = Result<(), BoxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_alias_names_both_commands() {
        let err = ConfigError::DuplicateAlias {
            alias: "ping".into(),
            first: "PingCommand".into(),
            second: "PongCommand".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("PingCommand"));
        assert!(msg.contains("PongCommand"));
    }

    #[test]
    fn test_missing_restriction_lists_known_ids() {
        let err = ConfigError::MissingRestriction {
            id: "admin".into(),
            known: vec!["everyone".into(), "nobody".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("admin"));
        assert!(msg.contains("everyone"));
        assert!(msg.contains("nobody"));
    }

    #[test]
    fn test_config_error_converts_into_dispatch_error() {
        let err: DispatchError = ConfigError::DuplicateTransformer {
            phase: TransformPhase::BeforePrefixComputation,
        }
        .into();
        assert!(err.is_config());
    }
}
