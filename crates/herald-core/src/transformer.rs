//! Phase transformer hooks.
//!
//! The dispatcher offers six interception points, one before and one after
//! each of the resolution phases. A [`ContextTransformer`] bound to a slot
//! receives the current context and returns a (possibly identical) context.
//! Setting a later field, such as the command, makes the dispatcher skip the
//! phases that would otherwise compute it.

use std::fmt;
use std::sync::Arc;

use crate::context::InvocationContext;
use crate::error::{ConfigError, ConfigResult};

/// A transformer slot in the dispatch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransformPhase {
    BeforePrefixComputation,
    AfterPrefixComputation,
    BeforeAliasAndParameterStringComputation,
    AfterAliasAndParameterStringComputation,
    BeforeCommandComputation,
    AfterCommandComputation,
}

impl TransformPhase {
    /// Every phase, in pipeline order.
    pub const ALL: [TransformPhase; 6] = [
        Self::BeforePrefixComputation,
        Self::AfterPrefixComputation,
        Self::BeforeAliasAndParameterStringComputation,
        Self::AfterAliasAndParameterStringComputation,
        Self::BeforeCommandComputation,
        Self::AfterCommandComputation,
    ];

    /// Returns the phase name in `snake_case`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforePrefixComputation => "before_prefix_computation",
            Self::AfterPrefixComputation => "after_prefix_computation",
            Self::BeforeAliasAndParameterStringComputation => {
                "before_alias_and_parameter_string_computation"
            }
            Self::AfterAliasAndParameterStringComputation => {
                "after_alias_and_parameter_string_computation"
            }
            Self::BeforeCommandComputation => "before_command_computation",
            Self::AfterCommandComputation => "after_command_computation",
        }
    }

    /// Fails with [`ConfigError::UnexpectedPhase`] unless `self == expected`.
    ///
    /// Hand-written transformers call this first thing in
    /// [`ContextTransformer::transform`].
    pub fn expect(self, expected: TransformPhase) -> ConfigResult<()> {
        if self == expected {
            Ok(())
        } else {
            Err(ConfigError::UnexpectedPhase {
                expected,
                got: self,
            })
        }
    }
}

impl fmt::Display for TransformPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hook that may rewrite the context at a fixed point in the pipeline.
pub trait ContextTransformer<M>: Send + Sync {
    /// Returns the context the pipeline continues with.
    ///
    /// Implementations should reject phases they were not written for with
    /// [`TransformPhase::expect`].
    fn transform(
        &self,
        ctx: InvocationContext<M>,
        phase: TransformPhase,
    ) -> ConfigResult<InvocationContext<M>>;
}

/// A shared, type-erased transformer.
pub type BoxedTransformer<M> = Arc<dyn ContextTransformer<M>>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Tagger;

    impl ContextTransformer<()> for Tagger {
        fn transform(
            &self,
            ctx: InvocationContext<()>,
            phase: TransformPhase,
        ) -> ConfigResult<InvocationContext<()>> {
            phase.expect(TransformPhase::BeforePrefixComputation)?;
            Ok(ctx.with_data("tagged", true))
        }
    }

    #[test]
    fn test_expect_matching_phase() {
        assert!(
            TransformPhase::AfterCommandComputation
                .expect(TransformPhase::AfterCommandComputation)
                .is_ok()
        );
    }

    #[test]
    fn test_expect_mismatched_phase() {
        let err = TransformPhase::AfterPrefixComputation
            .expect(TransformPhase::BeforePrefixComputation)
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnexpectedPhase {
                expected: TransformPhase::BeforePrefixComputation,
                got: TransformPhase::AfterPrefixComputation,
            }
        );
    }

    #[test]
    fn test_transformer_rejects_wrong_phase() {
        let transformer: BoxedTransformer<()> = Arc::new(Tagger);
        let ctx = InvocationContext::new((), "!x");

        let tagged = transformer
            .transform(ctx.clone(), TransformPhase::BeforePrefixComputation)
            .unwrap();
        assert_eq!(tagged.data::<bool>("tagged"), Some(&true));

        assert!(
            transformer
                .transform(ctx, TransformPhase::AfterCommandComputation)
                .is_err()
        );
    }

    #[test]
    fn test_all_is_in_pipeline_order() {
        let mut sorted = TransformPhase::ALL;
        sorted.sort();
        assert_eq!(sorted, TransformPhase::ALL);
        assert_eq!(
            TransformPhase::BeforeCommandComputation.to_string(),
            "before_command_computation"
        );
    }
}
