//! Closure-based commands.
//!
//! Implementing [`Command`] by hand is the most flexible option. For the
//! common case a command is just a few aliases and an async closure:
//!
//! ```rust,ignore
//! use herald_framework::command;
//!
//! let echo = command(["echo", "say"])
//!     .description("Repeats the parameters back")
//!     .usage("echo <text>")
//!     .handler(|ctx: InvocationContext<ChatMessage>| async move {
//!         ctx.message().reply(ctx.parameter_string().unwrap_or_default()).await?;
//!         Ok(())
//!     });
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use herald_core::{BoxedCommand, Command, CommandResult, InvocationContext, RestrictionChain};

/// Starts a closure command triggered by `aliases`.
pub fn command<M, I, S>(aliases: I) -> CommandBuilder<M>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandBuilder::new(aliases)
}

/// Builder for a closure command. Finish with [`handler`](Self::handler).
pub struct CommandBuilder<M> {
    name: Option<String>,
    aliases: Vec<String>,
    description: Option<String>,
    usage: Option<String>,
    restriction_chain: RestrictionChain,
    asynchronous: bool,
    _marker: PhantomData<fn() -> M>,
}

impl<M> CommandBuilder<M> {
    pub fn new<I, S>(aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            aliases: aliases.into_iter().map(Into::into).collect(),
            description: None,
            usage: None,
            restriction_chain: RestrictionChain::everyone(),
            asynchronous: false,
            _marker: PhantomData,
        }
    }

    /// Sets the diagnostic name. Defaults to the first alias.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    /// Gates the command behind `chain`.
    pub fn restricted_to(mut self, chain: impl Into<RestrictionChain>) -> Self {
        self.restriction_chain = chain.into();
        self
    }

    /// Runs the body on the executor gateway instead of inline.
    pub fn asynchronous(mut self, asynchronous: bool) -> Self {
        self.asynchronous = asynchronous;
        self
    }

    /// Finishes the command with its body.
    ///
    /// The closure receives an owned clone of the final context.
    pub fn handler<F, Fut>(self, handler: F) -> BoxedCommand<M>
    where
        M: Send + Sync + 'static,
        F: Fn(InvocationContext<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult> + Send + 'static,
    {
        let name = self
            .name
            .or_else(|| self.aliases.first().cloned())
            .unwrap_or_else(|| "<unnamed>".to_string());

        Arc::new(FnCommand {
            name,
            aliases: self.aliases,
            description: self.description,
            usage: self.usage,
            restriction_chain: self.restriction_chain,
            asynchronous: self.asynchronous,
            handler,
            _marker: PhantomData,
        })
    }
}

struct FnCommand<M, F> {
    name: String,
    aliases: Vec<String>,
    description: Option<String>,
    usage: Option<String>,
    restriction_chain: RestrictionChain,
    asynchronous: bool,
    handler: F,
    _marker: PhantomData<fn() -> M>,
}

#[async_trait]
impl<M, F, Fut> Command<M> for FnCommand<M, F>
where
    M: Send + Sync + 'static,
    F: Fn(InvocationContext<M>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CommandResult> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn aliases(&self) -> Vec<String> {
        self.aliases.clone()
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn usage(&self) -> Option<&str> {
        self.usage.as_deref()
    }

    fn restriction_chain(&self) -> &RestrictionChain {
        &self.restriction_chain
    }

    fn is_asynchronous(&self) -> bool {
        self.asynchronous
    }

    async fn execute(&self, ctx: &InvocationContext<M>) -> CommandResult {
        (self.handler)(ctx.clone()).await
    }
}
