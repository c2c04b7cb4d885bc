//! The command dispatcher.
//!
//! [`Dispatcher`] drives an [`InvocationContext`] through four stages:
//!
//! ```text
//! ┌────────┐   ┌─────────────────────────┐   ┌─────────┐   ┌───────────┐
//! │ Prefix │──▶│ Alias & Parameter String│──▶│ Command │──▶│ Execution │
//! └────────┘   └─────────────────────────┘   └─────────┘   └───────────┘
//! ```
//!
//! Each of the first three stages has a "before" and an "after"
//! [`TransformPhase`] slot. Before a stage runs, and after every transformer,
//! the dispatcher fast-forwards past stages whose output is already present
//! on the context:
//!
//! 1. `command` set: jump to Execution
//! 2. else `alias` set: jump to Command
//! 3. else `prefix` set: jump to Alias & Parameter String
//!
//! The one exception is the "after command computation" slot: Execution
//! always follows it, and Execution performs its own not-found check.
//!
//! Text that does not start with the prefix is ignored without any
//! notification. A prefixed message whose alias cannot be resolved produces
//! [`DispatchEvent::CommandNotFound`]; a resolved command whose restriction
//! chain rejects the invocation produces [`DispatchEvent::CommandNotAllowed`].
//!
//! ```rust,ignore
//! use herald_framework::{Dispatcher, command};
//!
//! let dispatcher = Dispatcher::builder()
//!     .prefix("!")
//!     .command(ping_command)
//!     .sink(not_found_tx)
//!     .build()?;
//!
//! dispatcher.handle_message(message, "!ping hello").await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Once};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tower::Service;
use tracing::{Instrument, debug, debug_span, trace, warn};

use herald_core::{
    BoxedCommand, BoxedRestriction, BoxedSink, BoxedTransformer, Command, ConfigError,
    ConfigResult, ContextTransformer, DispatchError, DispatchEvent, DispatchResult, EVERYONE,
    EventSink, InvocationContext, NOBODY, Restriction, RestrictionLookup, TransformPhase,
};

use crate::alias::AliasRegistry;
use crate::executor::{ExecutorGateway, ExecutorOptions, ExecutorStats};
use crate::restrictions::{Everyone, Nobody};
use crate::transformer::PhaseTransformer;

// =============================================================================
// Options & Outcome
// =============================================================================

/// Recognised dispatch options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchOptions {
    /// Literal string a message must start with. May be empty.
    pub prefix: String,
    /// Character separating the alias from its parameters, in addition to
    /// whitespace.
    pub argument_separator: char,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            argument_separator: ' ',
        }
    }
}

/// How a dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchOutcome {
    /// The text does not start with the prefix; not a command.
    Ignored,
    /// No command could be resolved. Sinks were notified.
    CommandNotFound,
    /// The command's restriction chain rejected the invocation. Sinks were notified.
    CommandNotAllowed,
    /// The command body ran inline and returned `Ok`.
    Executed,
    /// The command body was handed to the executor gateway.
    Spawned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Prefix,
    AliasAndParameterString,
    Command,
    Execution,
}

enum Flow<M> {
    Continue(Stage, InvocationContext<M>),
    NotFound(InvocationContext<M>),
    Ignored,
}

/// Returns the stage to jump to, if it lies beyond `current`.
fn fast_forward<M>(ctx: &InvocationContext<M>, current: Stage) -> Option<Stage> {
    let target = if ctx.command().is_some() {
        Stage::Execution
    } else if ctx.alias().is_some() {
        Stage::Command
    } else if ctx.prefix().is_some() {
        Stage::AliasAndParameterString
    } else {
        return None;
    };
    (target > current).then_some(target)
}

// =============================================================================
// Dispatcher
// =============================================================================

struct DispatcherInner<M> {
    options: DispatchOptions,
    registry: AliasRegistry<M>,
    commands: Vec<BoxedCommand<M>>,
    restrictions: RestrictionLookup<M>,
    transformers: HashMap<TransformPhase, BoxedTransformer<M>>,
    sinks: Vec<BoxedSink<M>>,
    executor: ExecutorGateway,
    empty_prefix_advisory: Once,
}

/// Resolves and executes commands. Cheap to clone.
pub struct Dispatcher<M> {
    inner: Arc<DispatcherInner<M>>,
}

impl<M> Clone for Dispatcher<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Send + Sync + 'static> Dispatcher<M> {
    pub fn builder() -> DispatcherBuilder<M> {
        DispatcherBuilder::new()
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.inner.options
    }

    /// Registered commands, in registration order.
    pub fn commands(&self) -> &[BoxedCommand<M>] {
        &self.inner.commands
    }

    pub fn registry(&self) -> &AliasRegistry<M> {
        &self.inner.registry
    }

    pub fn restrictions(&self) -> &RestrictionLookup<M> {
        &self.inner.restrictions
    }

    pub fn executor_stats(&self) -> ExecutorStats {
        self.inner.executor.stats()
    }

    /// Builds the initial context for `message` and dispatches it.
    pub async fn handle_message(
        &self,
        message: M,
        text: impl Into<Arc<str>>,
    ) -> DispatchResult<DispatchOutcome> {
        self.handle(InvocationContext::new(message, text)).await
    }

    /// Dispatches a context populated with at least message and text.
    ///
    /// Not-found and not-allowed are reported through the sinks and returned
    /// as outcomes. Errors are wiring defects, synchronous command failures,
    /// and executor rejection.
    pub async fn handle(&self, ctx: InvocationContext<M>) -> DispatchResult<DispatchOutcome> {
        let span = debug_span!("dispatch", text_len = ctx.text().len());
        self.run(ctx).instrument(span).await
    }

    /// Stops the executor gateway accepting work and waits for in-flight
    /// asynchronous commands.
    pub async fn shutdown(&self) {
        self.inner.executor.shutdown().await;
    }

    async fn run(&self, mut ctx: InvocationContext<M>) -> DispatchResult<DispatchOutcome> {
        let mut stage = Stage::Prefix;
        loop {
            if let Some(target) = fast_forward(&ctx, stage) {
                trace!(from = ?stage, to = ?target, "Fast-forwarding");
                stage = target;
            }

            let flow = match stage {
                Stage::Prefix => self.compute_prefix(ctx)?,
                Stage::AliasAndParameterString => self.compute_alias_and_parameter_string(ctx)?,
                Stage::Command => self.compute_command(ctx)?,
                Stage::Execution => return self.execute(ctx).await,
            };

            match flow {
                Flow::Continue(next, next_ctx) => {
                    stage = next;
                    ctx = next_ctx;
                }
                Flow::NotFound(ctx) => {
                    self.notify(DispatchEvent::CommandNotFound(ctx));
                    return Ok(DispatchOutcome::CommandNotFound);
                }
                Flow::Ignored => return Ok(DispatchOutcome::Ignored),
            }
        }
    }

    fn transform(
        &self,
        ctx: InvocationContext<M>,
        phase: TransformPhase,
    ) -> ConfigResult<InvocationContext<M>> {
        match self.inner.transformers.get(&phase) {
            Some(transformer) => {
                trace!(%phase, "Invoking transformer");
                transformer.transform(ctx, phase)
            }
            None => Ok(ctx),
        }
    }

    fn compute_prefix(&self, ctx: InvocationContext<M>) -> DispatchResult<Flow<M>> {
        let ctx = self.transform(ctx, TransformPhase::BeforePrefixComputation)?;
        if let Some(target) = fast_forward(&ctx, Stage::Prefix) {
            return Ok(Flow::Continue(target, ctx));
        }

        let prefix = &self.inner.options.prefix;
        if prefix.is_empty() {
            self.inner.empty_prefix_advisory.call_once(|| {
                warn!(
                    "Command prefix is empty; every message is matched against all aliases, \
                     which is costly and may trigger commands unintentionally"
                );
            });
        }
        let ctx = ctx.with_prefix(prefix.as_str());

        let ctx = self.transform(ctx, TransformPhase::AfterPrefixComputation)?;
        Ok(Flow::Continue(Stage::AliasAndParameterString, ctx))
    }

    fn compute_alias_and_parameter_string(
        &self,
        ctx: InvocationContext<M>,
    ) -> DispatchResult<Flow<M>> {
        if ctx.prefix().is_none() {
            debug!("Prefix missing before alias computation");
            return Ok(Flow::NotFound(ctx));
        }

        let ctx = self.transform(
            ctx,
            TransformPhase::BeforeAliasAndParameterStringComputation,
        )?;
        if let Some(target) = fast_forward(&ctx, Stage::AliasAndParameterString) {
            return Ok(Flow::Continue(target, ctx));
        }
        let Some(prefix) = ctx.prefix() else {
            debug!("Prefix cleared by transformer");
            return Ok(Flow::NotFound(ctx));
        };

        let Some(remainder) = ctx.text().strip_prefix(prefix) else {
            trace!("Text does not start with prefix, ignoring");
            return Ok(Flow::Ignored);
        };

        let ctx = match self.inner.registry.match_alias(remainder.trim()) {
            Some(matched) => {
                trace!(alias = %matched.alias, "Alias matched");
                ctx.to_builder()
                    .alias(matched.alias)
                    .parameter_string(matched.parameter_string)
                    .build()
            }
            None => ctx,
        };

        let ctx = self.transform(ctx, TransformPhase::AfterAliasAndParameterStringComputation)?;
        Ok(Flow::Continue(Stage::Command, ctx))
    }

    fn compute_command(&self, ctx: InvocationContext<M>) -> DispatchResult<Flow<M>> {
        if ctx.alias().is_none() {
            debug!("No alias matched");
            return Ok(Flow::NotFound(ctx));
        }

        let ctx = self.transform(ctx, TransformPhase::BeforeCommandComputation)?;
        if let Some(target) = fast_forward(&ctx, Stage::Command) {
            return Ok(Flow::Continue(target, ctx));
        }
        let Some(alias) = ctx.alias() else {
            debug!("Alias cleared by transformer");
            return Ok(Flow::NotFound(ctx));
        };

        let ctx = match self.inner.registry.get(alias).cloned() {
            Some(command) => ctx.with_command(command),
            None => {
                debug!(alias = %alias, "Alias has no registered command");
                ctx
            }
        };

        let ctx = self.transform(ctx, TransformPhase::AfterCommandComputation)?;
        Ok(Flow::Continue(Stage::Execution, ctx))
    }

    async fn execute(&self, ctx: InvocationContext<M>) -> DispatchResult<DispatchOutcome> {
        let Some(command) = ctx.command().cloned() else {
            self.notify(DispatchEvent::CommandNotFound(ctx));
            return Ok(DispatchOutcome::CommandNotFound);
        };

        let chain = command.restriction_chain();
        if !chain.is_allowed(&ctx, &self.inner.restrictions)? {
            debug!(command = command.name(), chain = %chain, "Command not allowed");
            self.notify(DispatchEvent::CommandNotAllowed(ctx));
            return Ok(DispatchOutcome::CommandNotAllowed);
        }

        if command.is_asynchronous() {
            let label = command.name().to_string();
            debug!(command = %label, "Spawning asynchronous command");
            self.inner
                .executor
                .spawn(&label, async move { command.execute(&ctx).await })?;
            return Ok(DispatchOutcome::Spawned);
        }

        debug!(command = command.name(), "Executing command");
        command
            .execute(&ctx)
            .await
            .map_err(|source| DispatchError::Command {
                command: command.name().to_string(),
                source,
            })?;
        Ok(DispatchOutcome::Executed)
    }

    fn notify(&self, event: DispatchEvent<M>) {
        debug!(
            kind = event.kind(),
            text = %event.context().text(),
            "Dispatch ended without execution"
        );
        if let Some((last, rest)) = self.inner.sinks.split_last() {
            for sink in rest {
                sink.publish(event.clone());
            }
            last.publish(event);
        }
    }
}

impl<M> fmt::Debug for Dispatcher<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut phases: Vec<&TransformPhase> = self.inner.transformers.keys().collect();
        phases.sort();
        f.debug_struct("Dispatcher")
            .field("options", &self.inner.options)
            .field("registry", &self.inner.registry)
            .field("restrictions", &self.inner.restrictions)
            .field("transformers", &phases)
            .field("sinks", &self.inner.sinks.len())
            .field("executor", &self.inner.executor)
            .finish()
    }
}

// =============================================================================
// Tower Service Implementation
// =============================================================================

/// Lets hosts wrap the dispatcher in tower middleware, e.g. a timeout layer.
impl<M: Send + Sync + 'static> Service<InvocationContext<M>> for Dispatcher<M> {
    type Response = DispatchOutcome;
    type Error = DispatchError;
    type Future = BoxFuture<'static, Result<DispatchOutcome, DispatchError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: InvocationContext<M>) -> Self::Future {
        let dispatcher = self.clone();
        async move { dispatcher.handle(ctx).await }.boxed()
    }
}

// =============================================================================
// DispatcherBuilder
// =============================================================================

/// Collects commands, restrictions, transformers and sinks, then validates
/// the whole set in [`build`](Self::build).
pub struct DispatcherBuilder<M> {
    options: DispatchOptions,
    executor_options: ExecutorOptions,
    commands: Vec<BoxedCommand<M>>,
    restrictions: Vec<(String, BoxedRestriction<M>)>,
    transformers: Vec<(TransformPhase, BoxedTransformer<M>)>,
    sinks: Vec<BoxedSink<M>>,
}

impl<M: Send + Sync + 'static> DispatcherBuilder<M> {
    pub fn new() -> Self {
        Self {
            options: DispatchOptions::default(),
            executor_options: ExecutorOptions::default(),
            commands: Vec::new(),
            restrictions: Vec::new(),
            transformers: Vec::new(),
            sinks: Vec::new(),
        }
    }

    pub fn options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.prefix = prefix.into();
        self
    }

    pub fn argument_separator(mut self, separator: char) -> Self {
        self.options.argument_separator = separator;
        self
    }

    pub fn executor_options(mut self, options: ExecutorOptions) -> Self {
        self.executor_options = options;
        self
    }

    pub fn command(self, command: impl Command<M> + 'static) -> Self {
        self.boxed_command(Arc::new(command))
    }

    pub fn boxed_command(mut self, command: BoxedCommand<M>) -> Self {
        self.commands.push(command);
        self
    }

    pub fn commands(mut self, commands: impl IntoIterator<Item = BoxedCommand<M>>) -> Self {
        self.commands.extend(commands);
        self
    }

    /// Binds a restriction predicate to `id`.
    pub fn restriction(
        self,
        id: impl Into<String>,
        restriction: impl Restriction<M> + 'static,
    ) -> Self {
        self.boxed_restriction(id, Arc::new(restriction))
    }

    /// Binds a closure predicate to `id`.
    pub fn restriction_fn<F>(self, id: impl Into<String>, f: F) -> Self
    where
        F: Fn(&InvocationContext<M>) -> bool + Send + Sync + 'static,
    {
        self.boxed_restriction(id, Arc::new(f))
    }

    pub fn boxed_restriction(
        mut self,
        id: impl Into<String>,
        restriction: BoxedRestriction<M>,
    ) -> Self {
        self.restrictions.push((id.into(), restriction));
        self
    }

    /// Binds `transformer` to the `phase` slot.
    pub fn transformer(
        self,
        phase: TransformPhase,
        transformer: impl ContextTransformer<M> + 'static,
    ) -> Self {
        self.boxed_transformer(phase, Arc::new(transformer))
    }

    /// Binds a shared transformer to the `phase` slot. The same transformer
    /// may occupy several slots.
    pub fn boxed_transformer(
        mut self,
        phase: TransformPhase,
        transformer: BoxedTransformer<M>,
    ) -> Self {
        self.transformers.push((phase, transformer));
        self
    }

    /// Binds a closure to the `phase` slot.
    pub fn transform<F>(self, phase: TransformPhase, f: F) -> Self
    where
        F: Fn(InvocationContext<M>) -> InvocationContext<M> + Send + Sync + 'static,
    {
        self.transformer(phase, PhaseTransformer::new(phase, f))
    }

    pub fn sink(mut self, sink: impl EventSink<M> + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn boxed_sink(mut self, sink: BoxedSink<M>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Validates the configuration and builds the dispatcher.
    ///
    /// Fails on duplicate aliases, duplicate restriction identifiers, a
    /// command chain referencing an unregistered restriction, or more than
    /// one transformer in a phase slot.
    pub fn build(self) -> ConfigResult<Dispatcher<M>> {
        let mut restrictions = RestrictionLookup::new();
        restrictions.register(EVERYONE, Arc::new(Everyone))?;
        restrictions.register(NOBODY, Arc::new(Nobody))?;
        for (id, restriction) in self.restrictions {
            restrictions.register(id, restriction)?;
        }

        let mut transformers = HashMap::new();
        for (phase, transformer) in self.transformers {
            if transformers.insert(phase, transformer).is_some() {
                return Err(ConfigError::DuplicateTransformer { phase });
            }
        }

        for command in &self.commands {
            command.restriction_chain().validate(&restrictions)?;
        }

        let registry = AliasRegistry::build(&self.commands, self.options.argument_separator)?;

        debug!(
            prefix = %self.options.prefix,
            commands = self.commands.len(),
            aliases = registry.len(),
            restrictions = restrictions.len(),
            transformers = transformers.len(),
            sinks = self.sinks.len(),
            "Dispatcher built"
        );

        Ok(Dispatcher {
            inner: Arc::new(DispatcherInner {
                options: self.options,
                registry,
                commands: self.commands,
                restrictions,
                transformers,
                sinks: self.sinks,
                executor: ExecutorGateway::new(self.executor_options),
                empty_prefix_advisory: Once::new(),
            }),
        })
    }
}

impl<M: Send + Sync + 'static> Default for DispatcherBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::sync::mpsc;
    use tower::ServiceExt;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::Layer;
    use tracing_subscriber::layer::{Context, SubscriberExt};

    use herald_core::{CommandResult, RestrictionChain, async_trait};

    use super::*;
    use crate::command::command;

    type Events = mpsc::UnboundedReceiver<DispatchEvent<()>>;

    /// Records every context it is invoked with.
    #[derive(Default)]
    struct Spy {
        contexts: Mutex<Vec<InvocationContext<()>>>,
    }

    impl Spy {
        fn calls(&self) -> usize {
            self.contexts.lock().len()
        }

        fn last(&self) -> Option<InvocationContext<()>> {
            self.contexts.lock().last().cloned()
        }
    }

    struct SpyCommand {
        aliases: Vec<&'static str>,
        chain: RestrictionChain,
        asynchronous: bool,
        fail: bool,
        spy: Arc<Spy>,
    }

    impl SpyCommand {
        fn new(aliases: &[&'static str], spy: &Arc<Spy>) -> Self {
            Self {
                aliases: aliases.to_vec(),
                chain: RestrictionChain::everyone(),
                asynchronous: false,
                fail: false,
                spy: Arc::clone(spy),
            }
        }
    }

    #[async_trait]
    impl Command<()> for SpyCommand {
        fn name(&self) -> &str {
            self.aliases[0]
        }

        fn aliases(&self) -> Vec<String> {
            self.aliases.iter().map(|a| a.to_string()).collect()
        }

        fn restriction_chain(&self) -> &RestrictionChain {
            &self.chain
        }

        fn is_asynchronous(&self) -> bool {
            self.asynchronous
        }

        async fn execute(&self, ctx: &InvocationContext<()>) -> CommandResult {
            self.spy.contexts.lock().push(ctx.clone());
            if self.fail {
                return Err("spy failure".into());
            }
            Ok(())
        }
    }

    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Records which phases ran.
    struct Recorder {
        seen: Arc<Mutex<Vec<TransformPhase>>>,
    }

    impl ContextTransformer<()> for Recorder {
        fn transform(
            &self,
            ctx: InvocationContext<()>,
            phase: TransformPhase,
        ) -> ConfigResult<InvocationContext<()>> {
            self.seen.lock().push(phase);
            Ok(ctx)
        }
    }

    fn with_sink(builder: DispatcherBuilder<()>) -> (DispatcherBuilder<()>, Events) {
        let (tx, rx) = mpsc::unbounded_channel();
        (builder.sink(tx), rx)
    }

    fn recording(
        builder: DispatcherBuilder<()>,
    ) -> (DispatcherBuilder<()>, Arc<Mutex<Vec<TransformPhase>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let shared: BoxedTransformer<()> = Arc::new(Recorder {
            seen: Arc::clone(&seen),
        });
        let mut builder = builder;
        for phase in TransformPhase::ALL {
            builder = builder.boxed_transformer(phase, Arc::clone(&shared));
        }
        (builder, seen)
    }

    fn drain(rx: &mut Events) -> Vec<DispatchEvent<()>> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_end_to_end_ping() {
        let spy = Arc::new(Spy::default());
        let (builder, mut rx) = with_sink(
            Dispatcher::builder()
                .prefix("!")
                .restriction_fn("always", |_| true)
                .command(SpyCommand {
                    chain: RestrictionChain::leaf("always"),
                    ..SpyCommand::new(&["ping"], &spy)
                }),
        );
        let dispatcher = builder.build().unwrap();

        let outcome = dispatcher.handle_message((), "!ping hello").await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Executed);
        assert_eq!(spy.calls(), 1);
        let ctx = spy.last().unwrap();
        assert_eq!(ctx.prefix(), Some("!"));
        assert_eq!(ctx.alias(), Some("ping"));
        assert_eq!(ctx.parameter_string(), Some("hello"));
        assert_eq!(ctx.command().map(|c| c.name()), Some("ping"));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_restricted_command_notifies_not_allowed() {
        let spy = Arc::new(Spy::default());
        let (builder, mut rx) = with_sink(
            Dispatcher::builder()
                .restriction_fn("never", |_| false)
                .command(SpyCommand {
                    chain: RestrictionChain::leaf("never"),
                    ..SpyCommand::new(&["ping"], &spy)
                }),
        );
        let dispatcher = builder.build().unwrap();

        let outcome = dispatcher.handle_message((), "!ping").await.unwrap();

        assert_eq!(outcome, DispatchOutcome::CommandNotAllowed);
        assert_eq!(spy.calls(), 0);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_not_allowed());
        assert_eq!(events[0].context().alias(), Some("ping"));
    }

    #[tokio::test]
    async fn test_unprefixed_text_is_ignored_silently() {
        let spy = Arc::new(Spy::default());
        let (builder, mut rx) =
            with_sink(Dispatcher::builder().command(SpyCommand::new(&["ping"], &spy)));
        let dispatcher = builder.build().unwrap();

        let outcome = dispatcher.handle_message((), "ping").await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_alias_notifies_not_found_once() {
        let spy = Arc::new(Spy::default());
        let (builder, mut rx) =
            with_sink(Dispatcher::builder().command(SpyCommand::new(&["ping"], &spy)));
        let dispatcher = builder.build().unwrap();

        let outcome = dispatcher.handle_message((), "!pong").await.unwrap();

        assert_eq!(outcome, DispatchOutcome::CommandNotFound);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_not_found());
        assert!(events[0].context().alias().is_none());
    }

    #[tokio::test]
    async fn test_longer_alias_is_not_shadowed() {
        let ping = Arc::new(Spy::default());
        let pingpong = Arc::new(Spy::default());
        let dispatcher = Dispatcher::builder()
            .command(SpyCommand::new(&["ping"], &ping))
            .command(SpyCommand::new(&["pingpong"], &pingpong))
            .build()
            .unwrap();

        dispatcher.handle_message((), "!pingpong").await.unwrap();

        assert_eq!(ping.calls(), 0);
        assert_eq!(pingpong.calls(), 1);
        assert_eq!(pingpong.last().unwrap().parameter_string(), Some(""));
    }

    #[tokio::test]
    async fn test_fast_forward_skips_earlier_phases() {
        use TransformPhase::*;

        let spy = Arc::new(Spy::default());
        let (builder, seen) =
            recording(Dispatcher::builder().command(SpyCommand::new(&["ping"], &spy)));
        let dispatcher = builder.build().unwrap();
        let command = dispatcher.registry().get("ping").cloned().unwrap();

        let base = InvocationContext::new((), "!ping");
        let cases = [
            (
                base.with_prefix("!"),
                vec![
                    BeforeAliasAndParameterStringComputation,
                    AfterAliasAndParameterStringComputation,
                    BeforeCommandComputation,
                    AfterCommandComputation,
                ],
            ),
            (
                base.to_builder().prefix("!").alias("ping").build(),
                vec![BeforeCommandComputation, AfterCommandComputation],
            ),
            (
                base.with_alias("ping"),
                vec![BeforeCommandComputation, AfterCommandComputation],
            ),
            (base.with_command(Arc::clone(&command)), vec![]),
            (
                base.to_builder().alias("ping").command(command).build(),
                vec![],
            ),
        ];

        for (ctx, expected) in cases {
            seen.lock().clear();
            let outcome = dispatcher.handle(ctx).await.unwrap();
            assert_eq!(outcome, DispatchOutcome::Executed);
            assert_eq!(*seen.lock(), expected);
        }
        assert_eq!(spy.calls(), 5);
    }

    #[tokio::test]
    async fn test_command_set_by_first_transformer_skips_everything() {
        let spy = Arc::new(Spy::default());
        let other = Arc::new(Spy::default());
        let target: BoxedCommand<()> = Arc::new(SpyCommand::new(&["target"], &spy));
        let injected = Arc::clone(&target);

        let dispatcher = Dispatcher::builder()
            .boxed_command(target)
            .command(SpyCommand::new(&["other"], &other))
            .transform(TransformPhase::BeforePrefixComputation, move |ctx| {
                ctx.with_command(Arc::clone(&injected))
            })
            .transform(TransformPhase::AfterPrefixComputation, |_| {
                panic!("after-prefix transformer must be skipped")
            })
            .build()
            .unwrap();

        let outcome = dispatcher
            .handle_message((), "no prefix at all")
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Executed);
        assert_eq!(spy.calls(), 1);
        assert!(spy.last().unwrap().prefix().is_none());
        assert_eq!(other.calls(), 0);
    }

    #[tokio::test]
    async fn test_transformer_supplies_custom_prefix() {
        let spy = Arc::new(Spy::default());
        let dispatcher = Dispatcher::builder()
            .command(SpyCommand::new(&["ping"], &spy))
            .transform(TransformPhase::BeforePrefixComputation, |ctx| {
                ctx.with_prefix("<@bot>")
            })
            .build()
            .unwrap();

        let outcome = dispatcher
            .handle_message((), "<@bot>  ping  a b ")
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Executed);
        let ctx = spy.last().unwrap();
        assert_eq!(ctx.prefix(), Some("<@bot>"));
        assert_eq!(ctx.parameter_string(), Some("a b"));
    }

    #[tokio::test]
    async fn test_after_alias_transformer_can_supply_alias() {
        let spy = Arc::new(Spy::default());
        let dispatcher = Dispatcher::builder()
            .command(SpyCommand::new(&["help"], &spy))
            .transform(
                TransformPhase::AfterAliasAndParameterStringComputation,
                |ctx| match ctx.alias() {
                    Some(_) => ctx,
                    None => ctx.with_alias("help"),
                },
            )
            .build()
            .unwrap();

        let outcome = dispatcher.handle_message((), "!whatever").await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Executed);
        assert_eq!(spy.calls(), 1);
    }

    #[tokio::test]
    async fn test_transformer_clearing_prefix_is_not_found() {
        let spy = Arc::new(Spy::default());
        let (builder, mut rx) = with_sink(
            Dispatcher::builder()
                .command(SpyCommand::new(&["ping"], &spy))
                .transform(TransformPhase::AfterPrefixComputation, |ctx| {
                    ctx.to_builder().clear_prefix().build()
                }),
        );
        let dispatcher = builder.build().unwrap();

        let outcome = dispatcher.handle_message((), "!ping").await.unwrap();

        assert_eq!(outcome, DispatchOutcome::CommandNotFound);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_transformer_clearing_alias_is_not_found() {
        let spy = Arc::new(Spy::default());
        let dispatcher = Dispatcher::builder()
            .command(SpyCommand::new(&["ping"], &spy))
            .transform(TransformPhase::BeforeCommandComputation, |ctx| {
                ctx.to_builder().clear_alias().build()
            })
            .build()
            .unwrap();

        let outcome = dispatcher.handle_message((), "!ping").await.unwrap();
        assert_eq!(outcome, DispatchOutcome::CommandNotFound);
        assert_eq!(spy.calls(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_alias_from_transformer_is_not_found_at_execution() {
        let spy = Arc::new(Spy::default());
        let (builder, mut rx) = with_sink(
            Dispatcher::builder()
                .command(SpyCommand::new(&["ping"], &spy))
                .transform(TransformPhase::BeforeCommandComputation, |ctx| {
                    ctx.with_alias("ghost")
                }),
        );
        let dispatcher = builder.build().unwrap();

        let outcome = dispatcher.handle_message((), "!ping").await.unwrap();

        assert_eq!(outcome, DispatchOutcome::CommandNotFound);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].context().alias(), Some("ghost"));
        assert!(events[0].context().command().is_none());
    }

    #[tokio::test]
    async fn test_after_command_transformer_result_goes_to_execution() {
        let spy = Arc::new(Spy::default());
        let (builder, mut rx) = with_sink(
            Dispatcher::builder()
                .command(SpyCommand::new(&["ping"], &spy))
                .transform(TransformPhase::AfterCommandComputation, |ctx| {
                    ctx.to_builder().clear_command().build()
                }),
        );
        let dispatcher = builder.build().unwrap();

        let outcome = dispatcher.handle_message((), "!ping").await.unwrap();

        assert_eq!(outcome, DispatchOutcome::CommandNotFound);
        assert_eq!(spy.calls(), 0);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_multiple_sinks_all_notified() {
        let count = Arc::new(AtomicUsize::new(0));
        let first = Arc::clone(&count);
        let second = Arc::clone(&count);
        let dispatcher = Dispatcher::<()>::builder()
            .sink(herald_core::sink_fn(move |_: DispatchEvent<()>| {
                first.fetch_add(1, Ordering::SeqCst);
            }))
            .sink(herald_core::sink_fn(move |_: DispatchEvent<()>| {
                second.fetch_add(1, Ordering::SeqCst);
            }))
            .build()
            .unwrap();

        dispatcher.handle_message((), "!anything").await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_synchronous_failure_propagates() {
        let spy = Arc::new(Spy::default());
        let dispatcher = Dispatcher::builder()
            .command(SpyCommand {
                fail: true,
                ..SpyCommand::new(&["boom"], &spy)
            })
            .build()
            .unwrap();

        let err = dispatcher.handle_message((), "!boom").await.unwrap_err();
        match err {
            DispatchError::Command { command, source } => {
                assert_eq!(command, "boom");
                assert_eq!(source.to_string(), "spy failure");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_asynchronous_failure_is_contained() {
        let spy = Arc::new(Spy::default());
        let dispatcher = Dispatcher::builder()
            .command(SpyCommand {
                fail: true,
                asynchronous: true,
                ..SpyCommand::new(&["boom"], &spy)
            })
            .build()
            .unwrap();

        let outcome = dispatcher.handle_message((), "!boom").await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Spawned);

        dispatcher.shutdown().await;
        assert_eq!(spy.calls(), 1);
        let stats = dispatcher.executor_stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.facilities_created, 1);
    }

    #[tokio::test]
    async fn test_spawn_after_shutdown_is_an_error() {
        let spy = Arc::new(Spy::default());
        let dispatcher = Dispatcher::builder()
            .command(SpyCommand {
                asynchronous: true,
                ..SpyCommand::new(&["later"], &spy)
            })
            .build()
            .unwrap();

        dispatcher.shutdown().await;
        let err = dispatcher.handle_message((), "!later").await.unwrap_err();
        assert!(matches!(err, DispatchError::ExecutorShutdown));
    }

    #[tokio::test]
    async fn test_dropping_dispatcher_lets_running_commands_finish() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let body = move |_: InvocationContext<()>| {
            let flag = Arc::clone(&flag);
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                flag.store(true, Ordering::SeqCst);
                CommandResult::Ok(())
            }
        };
        let dispatcher = Dispatcher::builder()
            .boxed_command(command(["slow"]).asynchronous(true).handler(body))
            .build()
            .unwrap();

        let outcome = dispatcher.handle_message((), "!slow").await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Spawned);

        drop(dispatcher);
        for _ in 0..40 {
            if finished.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_closure_command_and_custom_separator() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let dispatcher = Dispatcher::builder()
            .prefix("/")
            .argument_separator(':')
            .boxed_command(command(["set"]).handler(move |ctx: InvocationContext<()>| {
                let sink = Arc::clone(&sink);
                async move {
                    *sink.lock() = ctx.parameter_string().map(str::to_string);
                    Ok(())
                }
            }))
            .build()
            .unwrap();

        dispatcher
            .handle_message((), "/set::volume=3")
            .await
            .unwrap();
        assert_eq!(seen.lock().as_deref(), Some("volume=3"));
    }

    #[tokio::test]
    async fn test_empty_prefix_matches_every_message() {
        let spy = Arc::new(Spy::default());
        let dispatcher = Dispatcher::builder()
            .prefix("")
            .command(SpyCommand::new(&["ping"], &spy))
            .build()
            .unwrap();

        assert_eq!(
            dispatcher.handle_message((), "ping").await.unwrap(),
            DispatchOutcome::Executed
        );
        assert_eq!(
            dispatcher.handle_message((), "  ping  x").await.unwrap(),
            DispatchOutcome::Executed
        );
        assert_eq!(spy.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_prefix_warns_once() {
        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));
        let _guard = tracing::subscriber::set_default(subscriber);

        let spy = Arc::new(Spy::default());
        let dispatcher = Dispatcher::builder()
            .prefix("")
            .command(SpyCommand::new(&["ping"], &spy))
            .build()
            .unwrap();

        for _ in 0..3 {
            assert_eq!(
                dispatcher.handle_message((), "ping").await.unwrap(),
                DispatchOutcome::Executed
            );
        }
        assert_eq!(spy.calls(), 3);
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tower_service() {
        let spy = Arc::new(Spy::default());
        let dispatcher = Dispatcher::builder()
            .command(SpyCommand::new(&["ping"], &spy))
            .build()
            .unwrap();

        let outcome = dispatcher
            .oneshot(InvocationContext::new((), "!ping"))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Executed);
    }

    #[test]
    fn test_duplicate_alias_fails_build() {
        let spy = Arc::new(Spy::default());
        let result = Dispatcher::builder()
            .command(SpyCommand::new(&["ping"], &spy))
            .command(SpyCommand::new(&["pong", "ping"], &spy))
            .build();
        assert!(matches!(result, Err(ConfigError::DuplicateAlias { .. })));
    }

    #[test]
    fn test_duplicate_transformer_fails_build() {
        let result = Dispatcher::<()>::builder()
            .transform(TransformPhase::AfterPrefixComputation, |ctx| ctx)
            .transform(TransformPhase::AfterPrefixComputation, |ctx| ctx)
            .build();
        assert_eq!(
            result.err(),
            Some(ConfigError::DuplicateTransformer {
                phase: TransformPhase::AfterPrefixComputation
            })
        );
    }

    #[test]
    fn test_missing_restriction_fails_build() {
        let spy = Arc::new(Spy::default());
        let result = Dispatcher::builder()
            .command(SpyCommand {
                chain: RestrictionChain::leaf("admins"),
                ..SpyCommand::new(&["ban"], &spy)
            })
            .build();
        match result {
            Err(ConfigError::MissingRestriction { id, known }) => {
                assert_eq!(id, "admins");
                assert_eq!(known, vec!["everyone".to_string(), "nobody".to_string()]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_builtin_restriction_ids_are_reserved() {
        let result = Dispatcher::<()>::builder()
            .restriction_fn(EVERYONE, |_| false)
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::DuplicateRestriction { .. })
        ));
    }

    #[tokio::test]
    async fn test_misregistered_transformer_surfaces_config_error() {
        let dispatcher = Dispatcher::<()>::builder()
            .transformer(
                TransformPhase::BeforePrefixComputation,
                PhaseTransformer::new(
                    TransformPhase::AfterPrefixComputation,
                    |ctx: InvocationContext<()>| ctx,
                ),
            )
            .build()
            .unwrap();

        let err = dispatcher.handle_message((), "!x").await.unwrap_err();
        assert!(err.is_config());
    }
}
