//! Error types raised by the broker and its collaborators.
//!
//! Each concern has its own `thiserror` enum with structured context. I/O and
//! JSON errors are wrapped in `Arc` so the enums stay `Clone`-friendly for
//! observers and small enough for the `result_large_err` lint.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::transport::Stream;

/// The core subprocess could not be started.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The executable does not exist or is not on `PATH`.
    #[error("core executable not found: {command}")]
    BinaryNotFound {
        /// The executable that was looked up.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The process could not be launched or its pipes were unavailable.
    #[error("failed to start core process {command}: {message}")]
    SpawnFailed {
        /// The executable being launched.
        command: String,
        /// Description of the failure.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// A read or write on a live stream failed.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Reading a line from one of the core's output pipes failed.
    #[error("failed to read from core {stream}: {source}")]
    Read {
        /// The stream being read.
        stream: Stream,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Writing a line to a sink failed.
    #[error("failed to write to {sink}: {source}")]
    Write {
        /// Name of the sink being written.
        sink: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// A line could not be decoded into an envelope.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The line contained only whitespace.
    #[error("empty line")]
    Empty,

    /// The line was not valid JSON.
    #[error("invalid JSON in line {line:?}: {source}")]
    InvalidJson {
        /// The offending raw line.
        line: String,
        /// The parser error.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// The line decoded to something other than a JSON object.
    #[error("envelope is not a JSON object: {line:?}")]
    NotAnObject {
        /// The offending raw line.
        line: String,
    },

    /// The object had no string `messageType` field.
    #[error("envelope has no messageType: {line:?}")]
    MissingMessageType {
        /// The offending raw line.
        line: String,
    },
}

/// Failures raised by the correlation registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A continuation is already pending for this id.
    #[error("message id {id} already has a pending correlation")]
    DuplicateId {
        /// The reused message id.
        id: String,
    },

    /// The registry was cancelled during shutdown.
    #[error("correlation registry is closed")]
    Closed,
}

/// Failures raised by the outbound write queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue no longer accepts lines.
    #[error("write queue {name} is closed")]
    Closed {
        /// Name of the queue.
        name: String,
    },
}

/// Failures raised when hopping onto the resource-owning thread.
#[derive(Debug, Clone, Error)]
pub enum AffinityError {
    /// The owning thread could not be started.
    #[error("failed to start thread {name}: {source}")]
    Spawn {
        /// Name of the thread.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The owning thread has stopped.
    #[error("executor {name} is closed")]
    Closed {
        /// Name of the executor.
        name: String,
    },

    /// The closure did not finish within the configured bound.
    #[error("executor {name} timed out after {timeout_ms}ms")]
    Timeout {
        /// Name of the executor.
        name: String,
        /// The bound in milliseconds.
        timeout_ms: u64,
    },

    /// The closure panicked on the owning thread.
    #[error("task panicked on executor {name}")]
    Panicked {
        /// Name of the executor.
        name: String,
    },
}

/// A capability call could not be completed.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    /// A required request field was absent or had the wrong type.
    #[error("request is missing field {field}")]
    MissingField {
        /// The field name.
        field: &'static str,
    },

    /// A filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path being accessed.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// A command could not be executed.
    #[error("command {command} failed: {message}")]
    Command {
        /// The command line.
        command: String,
        /// Description of the failure.
        message: String,
    },

    /// The host cannot provide this capability.
    #[error("{capability} is unavailable: {message}")]
    Unavailable {
        /// Name of the capability.
        capability: &'static str,
        /// Description of why it is unavailable.
        message: String,
    },

    /// The UI-owning thread could not run the request.
    #[error(transparent)]
    Affinity(#[from] AffinityError),

    /// The result could not be encoded as JSON.
    #[error("failed to encode capability result: {0}")]
    Encode(#[source] Arc<serde_json::Error>),
}

impl CapabilityError {
    /// Wraps an I/O error with the path it concerns.
    #[must_use]
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}

impl From<serde_json::Error> for CapabilityError {
    fn from(error: serde_json::Error) -> Self {
        Self::Encode(Arc::new(error))
    }
}

/// Top-level broker failures.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The core subprocess could not be started.
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// A pump or writer thread could not be started.
    #[error("failed to start thread {name}: {source}")]
    Thread {
        /// Name of the thread.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// A continuation could not be registered.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The core's write queue is closed.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// An envelope could not be encoded.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] Arc<serde_json::Error>),
}

impl From<serde_json::Error> for BrokerError {
    fn from(error: serde_json::Error) -> Self {
        Self::Encode(Arc::new(error))
    }
}
