//! Executor gateway for asynchronous commands.
//!
//! Commands that declare themselves asynchronous are not awaited by the
//! dispatcher. Their bodies are handed to the [`ExecutorGateway`], which runs
//! them on a dedicated multi-threaded tokio runtime. The runtime is built on
//! first use, exactly once, even when several dispatches race to submit the
//! first asynchronous command.
//!
//! Failures never propagate back to the dispatcher: an `Err` returned by the
//! body, or a panic inside it, is logged at `ERROR` with the full error chain
//! and counted in [`ExecutorStats`].

use std::any::Any;
use std::error::Error as StdError;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::FutureExt;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio_util::task::TaskTracker;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, trace, warn};

use herald_core::{CommandResult, DispatchError, DispatchResult};

/// Sizing of the lazily built execution runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorOptions {
    /// Number of worker threads.
    pub worker_threads: usize,
    /// Name given to worker threads.
    pub thread_name: String,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            thread_name: "herald-command".to_string(),
        }
    }
}

/// Counters describing the gateway's lifetime activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Runtimes built. Never exceeds one.
    pub facilities_created: usize,
    /// Tasks accepted.
    pub spawned: usize,
    /// Tasks that returned `Ok`.
    pub completed: usize,
    /// Tasks that returned `Err` or panicked.
    pub failed: usize,
    /// Submissions refused after shutdown.
    pub rejected: usize,
    /// Tasks currently running.
    pub active: usize,
}

#[derive(Default)]
struct Counters {
    facilities_created: AtomicUsize,
    spawned: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    rejected: AtomicUsize,
}

struct Facility {
    runtime: Option<Runtime>,
    handle: Handle,
    tracker: TaskTracker,
}

impl Drop for Facility {
    fn drop(&mut self) {
        self.tracker.close();
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        if self.tracker.is_empty() {
            // Dropping a runtime blocks, which panics inside an async context.
            runtime.shutdown_background();
            return;
        }

        // In-flight bodies run to completion on a detached drainer thread.
        let pending = self.tracker.len();
        let tracker = self.tracker.clone();
        let drainer = std::thread::Builder::new()
            .name("herald-executor-drain".to_string())
            .spawn(move || {
                runtime.block_on(tracker.wait());
                drop(runtime);
            });
        match drainer {
            Ok(_) => debug!(pending, "Executor dropped, draining in-flight commands"),
            Err(e) => warn!(
                pending,
                error = %e,
                "Executor dropped and drainer thread unavailable, abandoning in-flight commands"
            ),
        }
    }
}

/// Runs asynchronous command bodies off the dispatching task.
pub struct ExecutorGateway {
    options: ExecutorOptions,
    facility: OnceCell<Facility>,
    accepting: AtomicBool,
    counters: Arc<Counters>,
}

impl ExecutorGateway {
    /// Creates a gateway. No thread is started until the first [`spawn`](Self::spawn).
    pub fn new(options: ExecutorOptions) -> Self {
        Self {
            options,
            facility: OnceCell::new(),
            accepting: AtomicBool::new(true),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Returns `true` once the execution runtime has been built.
    pub fn is_started(&self) -> bool {
        self.facility.get().is_some()
    }

    /// Returns `false` after [`shutdown`](Self::shutdown) has been called.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    fn facility(&self) -> DispatchResult<&Facility> {
        self.facility.get_or_try_init(|| {
            let runtime = Builder::new_multi_thread()
                .worker_threads(self.options.worker_threads.max(1))
                .thread_name(self.options.thread_name.clone())
                .enable_all()
                .build()
                .map_err(DispatchError::ExecutorUnavailable)?;

            self.counters
                .facilities_created
                .fetch_add(1, Ordering::SeqCst);
            debug!(
                worker_threads = self.options.worker_threads,
                thread_name = %self.options.thread_name,
                "Command executor started"
            );

            Ok(Facility {
                handle: runtime.handle().clone(),
                runtime: Some(runtime),
                tracker: TaskTracker::new(),
            })
        })
    }

    /// Submits a command body for execution.
    ///
    /// `label` names the command in log records. Returns
    /// [`DispatchError::ExecutorShutdown`] after shutdown and
    /// [`DispatchError::ExecutorUnavailable`] if the runtime cannot be built.
    pub fn spawn<F>(&self, label: &str, body: F) -> DispatchResult<()>
    where
        F: Future<Output = CommandResult> + Send + 'static,
    {
        if !self.is_accepting() {
            self.counters.rejected.fetch_add(1, Ordering::SeqCst);
            warn!(command = %label, "Executor is shut down, command rejected");
            return Err(DispatchError::ExecutorShutdown);
        }

        let facility = self.facility()?;
        let counters = Arc::clone(&self.counters);
        let label = label.to_string();

        let task = async move {
            match AssertUnwindSafe(body).catch_unwind().await {
                Ok(Ok(())) => {
                    counters.completed.fetch_add(1, Ordering::SeqCst);
                    trace!(command = %label, "Asynchronous command completed");
                }
                Ok(Err(e)) => {
                    counters.failed.fetch_add(1, Ordering::SeqCst);
                    error!(
                        command = %label,
                        error = %error_chain(e.as_ref()),
                        "Asynchronous command failed"
                    );
                }
                Err(panic) => {
                    counters.failed.fetch_add(1, Ordering::SeqCst);
                    error!(
                        command = %label,
                        panic = %panic_message(panic.as_ref()),
                        "Asynchronous command panicked"
                    );
                }
            }
        }
        .with_current_subscriber();

        facility.tracker.spawn_on(task, &facility.handle);
        self.counters.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Stops accepting new work and waits for in-flight bodies to finish.
    ///
    /// Running tasks are not cancelled.
    pub async fn shutdown(&self) {
        if self.accepting.swap(false, Ordering::AcqRel) {
            debug!("Command executor shutting down");
        }
        if let Some(facility) = self.facility.get() {
            facility.tracker.close();
            facility.tracker.wait().await;
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            facilities_created: self.counters.facilities_created.load(Ordering::SeqCst),
            spawned: self.counters.spawned.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            rejected: self.counters.rejected.load(Ordering::SeqCst),
            active: self.facility.get().map_or(0, |f| f.tracker.len()),
        }
    }
}

impl Default for ExecutorGateway {
    fn default() -> Self {
        Self::new(ExecutorOptions::default())
    }
}

impl std::fmt::Debug for ExecutorGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorGateway")
            .field("options", &self.options)
            .field("started", &self.is_started())
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
