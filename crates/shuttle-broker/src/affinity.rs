//! Thread-confined ownership of UI resources.
//!
//! [`AffinityExecutor`] owns a value on one dedicated thread. Other threads
//! submit closures with [`AffinityExecutor::run`] and block, for a bounded
//! time, until the owning thread has run them. Editor state and clipboard
//! handles live behind an executor so they are only ever touched from the
//! thread that created them.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::AffinityError;

/// Log target for thread-affinity hops.
const AFFINITY_TARGET: &str = "shuttle_broker::affinity";

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Runs closures against a value owned by a dedicated thread.
pub struct AffinityExecutor<S> {
    name: String,
    timeout: Duration,
    sender: Mutex<Option<Sender<Job<S>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl<S: 'static> AffinityExecutor<S> {
    /// Starts the owning thread with the value built by `init`.
    ///
    /// `init` runs on the new thread, so values that must be created where
    /// they are used (such as clipboard handles) are constructed there.
    ///
    /// # Errors
    ///
    /// Returns [`AffinityError::Spawn`] if the thread cannot be started.
    pub fn spawn<F>(name: impl Into<String>, timeout: Duration, init: F) -> Result<Self, AffinityError>
    where
        F: FnOnce() -> S + Send + 'static,
    {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job<S>>();
        let thread_name = name.clone();
        let worker = thread::Builder::new()
            .name(format!("shuttle-{name}"))
            .spawn(move || {
                let mut state = init();
                for job in receiver {
                    job(&mut state);
                }
                debug!(target: AFFINITY_TARGET, executor = %thread_name, "executor stopped");
            })
            .map_err(|source| AffinityError::Spawn {
                name: name.clone(),
                source: Arc::new(source),
            })?;

        Ok(Self {
            worker_id: worker.thread().id(),
            name,
            timeout,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Runs `task` on the owning thread and waits for its result.
    ///
    /// A call made from the owning thread itself would deadlock and is
    /// refused immediately with [`AffinityError::Timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`AffinityError::Closed`] after shutdown,
    /// [`AffinityError::Timeout`] when the bound elapses, and
    /// [`AffinityError::Panicked`] when `task` panics.
    pub fn run<R, F>(&self, task: F) -> Result<R, AffinityError>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        if thread::current().id() == self.worker_id {
            warn!(target: AFFINITY_TARGET, executor = %self.name, "re-entrant hop refused");
            return Err(self.timeout_error());
        }

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
            .ok_or_else(|| self.closed_error())?;

        let (reply, result) = mpsc::sync_channel(1);
        let job: Job<S> = Box::new(move |state: &mut S| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(state)));
            drop(reply.send(outcome));
        });
        sender.send(job).map_err(|_| self.closed_error())?;

        match result.recv_timeout(self.timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => {
                warn!(target: AFFINITY_TARGET, executor = %self.name, "task panicked");
                Err(AffinityError::Panicked {
                    name: self.name.clone(),
                })
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    target: AFFINITY_TARGET,
                    executor = %self.name,
                    timeout_ms = self.timeout_ms(),
                    "task timed out"
                );
                Err(self.timeout_error())
            }
            Err(RecvTimeoutError::Disconnected) => Err(self.closed_error()),
        }
    }

    /// Stops accepting work and waits for queued tasks to finish. Idempotent.
    pub fn shutdown(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(|poison| poison.into_inner())
                .take(),
        );
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .take();
        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                warn!(target: AFFINITY_TARGET, executor = %self.name, "executor thread panicked");
            }
        }
    }

    /// Name of the executor.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    fn timeout_error(&self) -> AffinityError {
        AffinityError::Timeout {
            name: self.name.clone(),
            timeout_ms: self.timeout_ms(),
        }
    }

    fn closed_error(&self) -> AffinityError {
        AffinityError::Closed {
            name: self.name.clone(),
        }
    }
}

impl<S> Drop for AffinityExecutor<S> {
    fn drop(&mut self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(|poison| poison.into_inner())
                .take(),
        );
    }
}

impl<S> std::fmt::Debug for AffinityExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AffinityExecutor")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
