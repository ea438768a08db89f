//! Broker assembly and lifecycle.
//!
//! [`Broker::start`] spawns the core, connects its stdin to a [`WriteQueue`],
//! and starts two pump threads: stdout lines go through the
//! [`MessageRouter`], stderr lines are logged. When stdout ends the broker
//! marks the core exited, stops writing, abandons pending correlations, and
//! tells the [`BrokerObserver`]. Restarting the core is left to the host.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::capability::IdeCapabilities;
use crate::dispatcher::CapabilityDispatcher;
use crate::envelope::Envelope;
use crate::error::{BrokerError, TransportError};
use crate::queue::WriteQueue;
use crate::registry::{Continuation, CorrelationRegistry};
use crate::router::{MessageRouter, UiDisposition};
use crate::routing::RoutingTable;
use crate::transport::{CoreCommand, CoreProcess, LineReader, ProcessState, Stream};
use crate::ui::UiSink;

/// Log target for broker lifecycle events.
const BROKER_TARGET: &str = "shuttle_broker::broker";

/// How long shutdown waits for the pumps to see end-of-stream before
/// detaching them. A descendant of the core can hold the pipes open.
const PUMP_JOIN_GRACE: Duration = Duration::from_millis(250);

/// Log target for the core's diagnostic output.
pub const CORE_STDERR_TARGET: &str = "shuttle_broker::core_stderr";

/// Default backlog size that triggers a stalled-core warning.
pub const DEFAULT_QUEUE_WARN_THRESHOLD: usize = 1024;

/// Receives lifecycle notifications from the broker.
pub trait BrokerObserver: Send + Sync {
    /// The core's output channel closed. Called once per broker.
    fn core_exited(&self, code: Option<i32>);

    /// A stream pump stopped on a read error.
    fn stream_failed(&self, stream: Stream, error: &TransportError);
}

/// Observer that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl BrokerObserver for TracingObserver {
    fn core_exited(&self, code: Option<i32>) {
        warn!(target: BROKER_TARGET, code = ?code, "core process exited");
    }

    fn stream_failed(&self, stream: Stream, error: &TransportError) {
        warn!(target: BROKER_TARGET, %stream, error = %error, "core stream failed");
    }
}

/// Collaborators handed to [`Broker::start`].
pub struct BrokerParts {
    routes: RoutingTable,
    ide: Arc<dyn IdeCapabilities>,
    ui: Arc<dyn UiSink>,
    observer: Arc<dyn BrokerObserver>,
    queue_warn_threshold: usize,
}

impl BrokerParts {
    /// Standard routing, a logging observer, and the default threshold.
    #[must_use]
    pub fn new(ide: Arc<dyn IdeCapabilities>, ui: Arc<dyn UiSink>) -> Self {
        Self {
            routes: RoutingTable::standard(),
            ide,
            ui,
            observer: Arc::new(TracingObserver),
            queue_warn_threshold: DEFAULT_QUEUE_WARN_THRESHOLD,
        }
    }

    /// Replaces the routing tables.
    #[must_use]
    pub fn with_routes(mut self, routes: RoutingTable) -> Self {
        self.routes = routes;
        self
    }

    /// Replaces the lifecycle observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn BrokerObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Sets the backlog size that triggers a stalled-core warning.
    #[must_use]
    pub const fn with_queue_warn_threshold(mut self, threshold: usize) -> Self {
        self.queue_warn_threshold = threshold;
        self
    }
}

struct Shared {
    router: MessageRouter,
    registry: Arc<CorrelationRegistry>,
    queue: WriteQueue,
    process: CoreProcess,
    state: Mutex<ProcessState>,
    observer: Arc<dyn BrokerObserver>,
    exit_reported: AtomicBool,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, ProcessState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn mark_exited(&self, code: Option<i32>) {
        let mut state = self.lock_state();
        if !matches!(*state, ProcessState::Exited { code: Some(_) }) {
            *state = ProcessState::Exited { code };
        }
    }

    fn pump_stdout<R: Read>(&self, stdout: R) {
        for line in LineReader::new(stdout, Stream::Stdout) {
            match line {
                Ok(line) => {
                    // Past shutdown only a descendant can still be writing.
                    if matches!(*self.lock_state(), ProcessState::Exited { .. }) {
                        continue;
                    }
                    self.router.handle_core_line(&line);
                }
                Err(error) => {
                    self.observer.stream_failed(Stream::Stdout, &error);
                    break;
                }
            }
        }
        self.core_finished();
    }

    fn pump_stderr<R: Read>(&self, stderr: R) {
        for line in LineReader::new(stderr, Stream::Stderr) {
            match line {
                Ok(line) => warn!(target: CORE_STDERR_TARGET, line = %line, "core stderr"),
                Err(error) => {
                    self.observer.stream_failed(Stream::Stderr, &error);
                    break;
                }
            }
        }
        debug!(target: BROKER_TARGET, "core stderr closed");
    }

    fn core_finished(&self) {
        self.queue.close();
        self.registry.cancel_all();
        let code = self.process.reap();
        self.mark_exited(code);
        if !self.exit_reported.swap(true, Ordering::AcqRel) {
            self.observer.core_exited(code);
        }
    }
}

/// A running broker instance.
///
/// Dropping the broker shuts it down.
pub struct Broker {
    shared: Arc<Shared>,
    pumps: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Broker {
    /// Spawns the core and starts routing.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Spawn`] when the core cannot be started and
    /// [`BrokerError::Thread`] when a pump thread cannot be created.
    pub fn start(command: &CoreCommand, parts: BrokerParts) -> Result<Self, BrokerError> {
        let (process, streams) = CoreProcess::spawn(command)?;
        let pid = process.pid();

        let queue = WriteQueue::spawn("core-stdin", streams.stdin, parts.queue_warn_threshold)
            .map_err(|source| thread_error("core-stdin", source))?;
        let registry = Arc::new(CorrelationRegistry::new());
        let router = MessageRouter::new(
            Arc::new(parts.routes),
            CapabilityDispatcher::new(parts.ide),
            Arc::clone(&registry),
            queue.handle(),
            parts.ui,
        );

        let shared = Arc::new(Shared {
            router,
            registry,
            queue,
            process,
            state: Mutex::new(ProcessState::Running { pid }),
            observer: parts.observer,
            exit_reported: AtomicBool::new(false),
        });
        let broker = Self {
            shared: Arc::clone(&shared),
            pumps: Mutex::new(Vec::with_capacity(2)),
            stopped: AtomicBool::new(false),
        };

        let stdout = streams.stdout;
        let stdout_shared = Arc::clone(&shared);
        broker.spawn_pump("core-stdout", move || stdout_shared.pump_stdout(stdout))?;
        let stderr = streams.stderr;
        let stderr_shared = Arc::clone(&shared);
        broker.spawn_pump("core-stderr", move || stderr_shared.pump_stderr(stderr))?;

        info!(
            target: BROKER_TARGET,
            pid,
            command = %command.executable().display(),
            "broker started"
        );
        Ok(broker)
    }

    /// Sends a request to the core. See [`MessageRouter::send_to_core`].
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when the request cannot be registered or queued.
    pub fn send_to_core(
        &self,
        message_type: &str,
        data: Value,
        message_id: Option<String>,
        continuation: Option<Continuation>,
    ) -> Result<String, BrokerError> {
        self.shared
            .router
            .send_to_core(message_type, data, message_id, continuation)
    }

    /// Injects an envelope from the UI. See
    /// [`MessageRouter::handle_ui_message`].
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when a forwarded request cannot be sent.
    pub fn handle_ui_message(
        &self,
        envelope: Envelope,
        continuation: Option<Continuation>,
    ) -> Result<UiDisposition, BrokerError> {
        self.shared.router.handle_ui_message(envelope, continuation)
    }

    /// Current liveness of the core.
    #[must_use]
    pub fn state(&self) -> ProcessState {
        *self.shared.lock_state()
    }

    /// Number of correlations awaiting a response.
    #[must_use]
    pub fn pending_correlations(&self) -> usize {
        self.shared.registry.len()
    }

    /// Tears the broker down. Idempotent.
    ///
    /// Pending correlations are discarded without being invoked, the write
    /// queue stops and the core is terminated. Pump threads that have not
    /// drained within a short grace period are detached; any line they read
    /// afterwards finds the registry closed and is dropped.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(target: BROKER_TARGET, "shutting down broker");

        let abandoned = self.shared.registry.cancel_all();
        self.shared.queue.close();
        let code = self.shared.process.terminate();
        self.shared.mark_exited(code);
        self.shared.queue.join();

        let pumps = std::mem::take(
            &mut *self
                .pumps
                .lock()
                .unwrap_or_else(|poison| poison.into_inner()),
        );
        let current = thread::current().id();
        let deadline = Instant::now() + PUMP_JOIN_GRACE;
        for pump in pumps {
            if pump.thread().id() == current {
                continue;
            }
            while !pump.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if !pump.is_finished() {
                debug!(
                    target: BROKER_TARGET,
                    pump = pump.thread().name().unwrap_or("pump"),
                    "detaching pump held open past shutdown"
                );
                drop(pump);
                continue;
            }
            if pump.join().is_err() {
                warn!(target: BROKER_TARGET, "pump thread panicked");
            }
        }
        info!(target: BROKER_TARGET, code = ?code, abandoned, "broker stopped");
    }

    fn spawn_pump<F>(&self, name: &str, pump: F) -> Result<(), BrokerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let spawned = thread::Builder::new()
            .name(format!("shuttle-{name}"))
            .spawn(pump);
        match spawned {
            Ok(handle) => {
                self.pumps
                    .lock()
                    .unwrap_or_else(|poison| poison.into_inner())
                    .push(handle);
                Ok(())
            }
            Err(source) => {
                self.shutdown();
                Err(thread_error(name, source))
            }
        }
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("state", &self.state())
            .field("pending", &self.pending_correlations())
            .finish_non_exhaustive()
    }
}

fn thread_error(name: &str, source: std::io::Error) -> BrokerError {
    BrokerError::Thread {
        name: name.to_owned(),
        source: Arc::new(source),
    }
}
