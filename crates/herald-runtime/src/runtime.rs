//! Composition root.
//!
//! [`HeraldRuntime`] loads configuration, initialises logging, collects the
//! pieces a host registers and turns them into a [`Dispatcher`]. Hosts that
//! only need the dispatcher call [`into_dispatcher`](HeraldRuntime::into_dispatcher);
//! hosts with a message stream hand the receiving end of a channel to
//! [`run`](HeraldRuntime::run).
//!
//! ```rust,ignore
//! use herald_runtime::{HeraldRuntime, Inbound};
//!
//! let runtime = HeraldRuntime::<ChatMessage>::builder()
//!     .config_file("herald.toml")
//!     .build()?;
//! runtime.register_command(ping);
//!
//! let (tx, rx) = tokio::sync::mpsc::channel(64);
//! adapter.forward_to(tx);
//! runtime.run(rx).await?;
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use herald_core::{
    BoxedCommand, BoxedRestriction, BoxedSink, BoxedTransformer, ContextTransformer, EventSink,
    Restriction, TransformPhase,
};
use herald_framework::Dispatcher;

use crate::config::{ConfigLoader, HeraldConfig};
use crate::error::RuntimeResult;
use crate::logging;

/// A message received from a platform, paired with its textual content.
#[derive(Debug, Clone)]
pub struct Inbound<M> {
    pub message: M,
    pub text: String,
}

impl<M> Inbound<M> {
    pub fn new(message: M, text: impl Into<String>) -> Self {
        Self {
            message,
            text: text.into(),
        }
    }
}

struct Registrations<M> {
    commands: Vec<BoxedCommand<M>>,
    restrictions: Vec<(String, BoxedRestriction<M>)>,
    transformers: Vec<(TransformPhase, BoxedTransformer<M>)>,
    sinks: Vec<BoxedSink<M>>,
}

impl<M> Default for Registrations<M> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            restrictions: Vec::new(),
            transformers: Vec::new(),
            sinks: Vec::new(),
        }
    }
}

/// The Herald runtime for messages of type `M`.
pub struct HeraldRuntime<M> {
    config: HeraldConfig,
    registrations: Mutex<Registrations<M>>,
    shutdown: CancellationToken,
}

impl<M: Send + Sync + 'static> HeraldRuntime<M> {
    /// Creates a runtime from configuration found in the current directory.
    ///
    /// Falls back to defaults if loading fails.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                HeraldConfig::default()
            });

        Self::from_config(&config)
    }

    pub fn builder() -> RuntimeBuilder<M> {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from already loaded configuration and initialises
    /// logging from it.
    pub fn from_config(config: &HeraldConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            prefix = %config.dispatch.prefix,
            worker_threads = config.executor.worker_threads,
            log_level = %config.logging.level,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            registrations: Mutex::new(Registrations::default()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &HeraldConfig {
        &self.config
    }

    // =========================================================================
    // Registration
    // =========================================================================

    pub fn register_command(&self, command: BoxedCommand<M>) {
        debug!(command = command.name(), "Registered command");
        self.registrations.lock().commands.push(command);
    }

    pub fn register_commands(&self, commands: impl IntoIterator<Item = BoxedCommand<M>>) {
        for command in commands {
            self.register_command(command);
        }
    }

    /// Binds a restriction predicate to `id`.
    pub fn register_restriction(
        &self,
        id: impl Into<String>,
        restriction: impl Restriction<M> + 'static,
    ) {
        let id = id.into();
        debug!(restriction = %id, "Registered restriction");
        self.registrations
            .lock()
            .restrictions
            .push((id, Arc::new(restriction)));
    }

    /// Binds `transformer` to the `phase` slot.
    pub fn register_transformer(
        &self,
        phase: TransformPhase,
        transformer: impl ContextTransformer<M> + 'static,
    ) {
        self.register_shared_transformer(phase, Arc::new(transformer));
    }

    /// Binds a shared transformer; the same one may occupy several slots.
    pub fn register_shared_transformer(
        &self,
        phase: TransformPhase,
        transformer: BoxedTransformer<M>,
    ) {
        debug!(%phase, "Registered transformer");
        self.registrations
            .lock()
            .transformers
            .push((phase, transformer));
    }

    pub fn register_sink(&self, sink: impl EventSink<M> + 'static) {
        self.registrations.lock().sinks.push(Arc::new(sink));
    }

    pub fn command_count(&self) -> usize {
        self.registrations.lock().commands.len()
    }

    /// A token that stops [`run`](Self::run) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    // =========================================================================
    // Composition
    // =========================================================================

    /// Builds the dispatcher from the configuration and everything registered.
    pub fn into_dispatcher(self) -> RuntimeResult<Dispatcher<M>> {
        let registrations = self.registrations.into_inner();

        let mut builder = Dispatcher::builder()
            .options(self.config.dispatch.to_options())
            .executor_options(self.config.executor.to_options())
            .commands(registrations.commands);
        for (id, restriction) in registrations.restrictions {
            builder = builder.boxed_restriction(id, restriction);
        }
        for (phase, transformer) in registrations.transformers {
            builder = builder.boxed_transformer(phase, transformer);
        }
        for sink in registrations.sinks {
            builder = builder.boxed_sink(sink);
        }

        Ok(builder.build()?)
    }

    // =========================================================================
    // Running
    // =========================================================================

    /// Dispatches inbound messages until the channel closes, the shutdown
    /// token is cancelled, or Ctrl+C / SIGTERM arrives.
    pub async fn run(self, inbound: mpsc::Receiver<Inbound<M>>) -> RuntimeResult<()> {
        info!("Herald runtime is now running. Press Ctrl+C to stop.");
        self.run_until(inbound, wait_for_signal()).await
    }

    /// Like [`run`](Self::run) with a custom shutdown future instead of
    /// process signals.
    pub async fn run_until<F>(
        self,
        mut inbound: mpsc::Receiver<Inbound<M>>,
        shutdown: F,
    ) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let token = self.shutdown.clone();
        let dispatcher = self.into_dispatcher()?;
        let tracker = TaskTracker::new();

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                received = inbound.recv() => {
                    let Some(Inbound { message, text }) = received else {
                        debug!("Inbound channel closed");
                        break;
                    };
                    let dispatcher = dispatcher.clone();
                    tracker.spawn(async move {
                        match dispatcher.handle_message(message, text).await {
                            Ok(outcome) => trace!(?outcome, "Message dispatched"),
                            Err(e) => error!(error = %e, "Dispatch failed"),
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = token.cancelled() => {
                    info!("Shutdown token cancelled");
                    break;
                }
            }
        }

        tracker.close();
        tracker.wait().await;
        dispatcher.shutdown().await;

        info!("Runtime stopped");
        Ok(())
    }
}

impl<M: Send + Sync + 'static> Default for HeraldRuntime<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for Ctrl+C or, on Unix, SIGTERM.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                wait_for_ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = wait_for_ctrl_c() => {}
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`HeraldRuntime`] with custom configuration sources.
///
/// ```rust,ignore
/// let runtime = HeraldRuntime::<ChatMessage>::builder()
///     .config_file("config/production.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder<M> {
    config_loader: ConfigLoader,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Send + Sync + 'static> RuntimeBuilder<M> {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            _marker: PhantomData,
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: HeraldConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn build(self) -> RuntimeResult<HeraldRuntime<M>> {
        let config = self.config_loader.load()?;
        Ok(HeraldRuntime::from_config(&config))
    }
}

impl<M: Send + Sync + 'static> Default for RuntimeBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}
