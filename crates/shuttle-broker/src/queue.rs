//! Single-writer FIFO onto a line-oriented sink.
//!
//! Any thread may [`QueueHandle::enqueue`] a line without blocking. One
//! dedicated worker writes lines in arrival order, each followed by `\n` and
//! a flush, so concurrent callers never interleave partial writes.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::error::{QueueError, TransportError};

/// Log target for write queue operations.
const QUEUE_TARGET: &str = "shuttle_broker::queue";

#[derive(Debug)]
enum Outbound {
    Line(String),
    Stop,
}

#[derive(Debug)]
struct Shared {
    name: String,
    accepting: AtomicBool,
    abandoned: AtomicBool,
    backlog: AtomicUsize,
    warn_threshold: usize,
}

/// Cloneable enqueue side of a [`WriteQueue`].
#[derive(Debug, Clone)]
pub struct QueueHandle {
    shared: Arc<Shared>,
    sender: Sender<Outbound>,
}

impl QueueHandle {
    /// Appends a line. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] once the queue has been closed or its
    /// sink has failed.
    pub fn enqueue(&self, line: impl Into<String>) -> Result<(), QueueError> {
        if !self.shared.accepting.load(Ordering::Acquire) {
            return Err(self.closed());
        }
        let depth = self.shared.backlog.fetch_add(1, Ordering::AcqRel) + 1;
        if self.sender.send(Outbound::Line(line.into())).is_err() {
            self.shared.backlog.fetch_sub(1, Ordering::AcqRel);
            return Err(self.closed());
        }
        if depth == self.shared.warn_threshold {
            warn!(
                target: QUEUE_TARGET,
                queue = %self.shared.name,
                backlog = depth,
                "write queue backlog reached warning threshold; the reader may be stalled"
            );
        }
        Ok(())
    }

    /// Lines accepted but not yet written.
    #[must_use]
    pub fn backlog(&self) -> usize {
        self.shared.backlog.load(Ordering::Acquire)
    }

    /// Whether the queue still accepts lines.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !self.shared.accepting.load(Ordering::Acquire)
    }

    fn closed(&self) -> QueueError {
        QueueError::Closed {
            name: self.shared.name.clone(),
        }
    }
}

/// Owns the writer thread behind a [`QueueHandle`].
#[derive(Debug)]
pub struct WriteQueue {
    handle: QueueHandle,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WriteQueue {
    /// Starts a worker that drains lines into `writer`.
    ///
    /// A warning is logged whenever the backlog reaches `warn_threshold`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the worker thread cannot be spawned.
    pub fn spawn<W>(
        name: impl Into<String>,
        writer: W,
        warn_threshold: usize,
    ) -> std::io::Result<Self>
    where
        W: Write + Send + 'static,
    {
        let shared = Arc::new(Shared {
            name: name.into(),
            accepting: AtomicBool::new(true),
            abandoned: AtomicBool::new(false),
            backlog: AtomicUsize::new(0),
            warn_threshold: warn_threshold.max(1),
        });
        let (sender, receiver) = mpsc::channel();
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(format!("shuttle-{}", shared.name))
            .spawn(move || drain(writer, &receiver, &worker_shared))?;

        Ok(Self {
            handle: QueueHandle { shared, sender },
            worker: Mutex::new(Some(worker)),
        })
    }

    /// A handle for enqueuing lines.
    #[must_use]
    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    /// Stops accepting lines and abandons anything not yet written.
    ///
    /// Does not wait for the worker; see [`WriteQueue::join`].
    pub fn close(&self) {
        let shared = &self.handle.shared;
        shared.accepting.store(false, Ordering::Release);
        if !shared.abandoned.swap(true, Ordering::AcqRel) {
            drop(self.handle.sender.send(Outbound::Stop));
        }
    }

    /// Stops accepting lines, writes everything already queued, and waits
    /// for the worker to finish.
    pub fn finish(&self) {
        let shared = &self.handle.shared;
        if shared.accepting.swap(false, Ordering::AcqRel) {
            drop(self.handle.sender.send(Outbound::Stop));
        }
        self.join();
    }

    /// Closes the queue and waits for the worker to exit.
    pub fn shutdown(&self) {
        self.close();
        self.join();
    }

    /// Waits for the worker to exit. Idempotent.
    pub fn join(&self) {
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
                warn!(
                    target: QUEUE_TARGET,
                    queue = %self.handle.shared.name,
                    "write queue worker panicked"
                );
            }
        }
    }
}

impl Drop for WriteQueue {
    fn drop(&mut self) {
        self.close();
    }
}

fn drain<W: Write>(mut writer: W, receiver: &Receiver<Outbound>, shared: &Shared) {
    while let Ok(Outbound::Line(line)) = receiver.recv() {
        if shared.abandoned.load(Ordering::Acquire) {
            break;
        }
        let written = write_line(&mut writer, &line);
        shared.backlog.fetch_sub(1, Ordering::AcqRel);
        if let Err(source) = written {
            let error = TransportError::Write {
                sink: shared.name.clone(),
                source: Arc::new(source),
            };
            warn!(target: QUEUE_TARGET, queue = %shared.name, error = %error, "write failed, closing queue");
            shared.accepting.store(false, Ordering::Release);
            break;
        }
    }
    debug!(target: QUEUE_TARGET, queue = %shared.name, "write queue worker stopped");
}

fn write_line<W: Write>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}
