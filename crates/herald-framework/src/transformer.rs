//! Closure transformers.

use std::fmt;

use herald_core::{ConfigResult, ContextTransformer, InvocationContext, TransformPhase};

/// A closure bound to a single [`TransformPhase`].
///
/// Invoking it in any other phase fails with
/// [`ConfigError::UnexpectedPhase`](herald_core::ConfigError::UnexpectedPhase).
pub struct PhaseTransformer<F> {
    phase: TransformPhase,
    f: F,
}

impl<F> PhaseTransformer<F> {
    pub fn new(phase: TransformPhase, f: F) -> Self {
        Self { phase, f }
    }

    /// The phase this transformer accepts.
    pub fn phase(&self) -> TransformPhase {
        self.phase
    }
}

impl<M, F> ContextTransformer<M> for PhaseTransformer<F>
where
    F: Fn(InvocationContext<M>) -> InvocationContext<M> + Send + Sync,
{
    fn transform(
        &self,
        ctx: InvocationContext<M>,
        phase: TransformPhase,
    ) -> ConfigResult<InvocationContext<M>> {
        phase.expect(self.phase)?;
        Ok((self.f)(ctx))
    }
}

impl<F> fmt::Debug for PhaseTransformer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseTransformer")
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

/// Wraps `f` as a transformer for `phase`.
pub fn transformer_fn<M, F>(phase: TransformPhase, f: F) -> PhaseTransformer<F>
where
    F: Fn(InvocationContext<M>) -> InvocationContext<M> + Send + Sync,
{
    PhaseTransformer::new(phase, f)
}

#[cfg(test)]
mod tests {
    use herald_core::ConfigError;

    use super::*;

    #[test]
    fn test_applies_in_own_phase() {
        let t = transformer_fn(
            TransformPhase::BeforePrefixComputation,
            |ctx: InvocationContext<()>| ctx.with_prefix("?"),
        );
        let ctx = InvocationContext::new((), "?x");
        let out = t
            .transform(ctx, TransformPhase::BeforePrefixComputation)
            .unwrap();
        assert_eq!(out.prefix(), Some("?"));
    }

    #[test]
    fn test_rejects_other_phase() {
        let t = transformer_fn(
            TransformPhase::AfterCommandComputation,
            |ctx: InvocationContext<()>| ctx,
        );
        let ctx = InvocationContext::new((), "x");
        let err = t
            .transform(ctx, TransformPhase::BeforeCommandComputation)
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnexpectedPhase {
                expected: TransformPhase::AfterCommandComputation,
                got: TransformPhase::BeforeCommandComputation,
            }
        );
    }
}
