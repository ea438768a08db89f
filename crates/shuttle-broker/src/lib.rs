//! Message broker linking a UI surface, a long-lived core subprocess, and the
//! host IDE's capabilities.
//!
//! The broker spawns the core and speaks newline-delimited JSON envelopes
//! over its stdin and stdout. Every inbound envelope is classified against a
//! [`RoutingTable`]: capability queries are answered locally through the
//! [`CapabilityDispatcher`], pass-through traffic is relayed between the UI
//! and the core, and responses are joined to their requests by `messageId`
//! in the [`CorrelationRegistry`].
//!
//! # Architecture
//!
//! - [`transport`]: spawns the core and exposes line readers over its pipes.
//! - [`queue`]: the single-writer FIFO that serialises lines onto a sink.
//! - [`registry`]: pending correlations, including streamed responses.
//! - [`router`]: the classification policy for both directions.
//! - [`dispatcher`] and [`capability`]: the IDE handler table and the
//!   capability interface it drives.
//! - [`affinity`]: runs closures on the thread that owns UI resources.
//! - [`broker`]: assembles the pieces and owns the pump threads.

pub mod affinity;
pub mod broker;
pub mod capability;
pub mod dispatcher;
pub mod envelope;
mod error;
pub mod queue;
pub mod registry;
pub mod router;
pub mod routing;
pub mod transport;
pub mod ui;

pub use affinity::AffinityExecutor;
pub use broker::{Broker, BrokerObserver, BrokerParts, TracingObserver};
pub use capability::{CurrentFile, IdeCapabilities, IdeInfo, IdeSettings, OnLoadPayload, ToastLevel};
pub use dispatcher::CapabilityDispatcher;
pub use envelope::{Envelope, generate_message_id, is_terminal, success_payload};
pub use error::{
    AffinityError, BrokerError, CapabilityError, DecodeError, QueueError, RegistryError,
    SpawnError, TransportError,
};
pub use queue::{QueueHandle, WriteQueue};
pub use registry::{Continuation, CorrelationRegistry};
pub use router::{CoreDisposition, MessageRouter, UiDisposition};
pub use routing::{RoutingTable, RoutingTableBuilder};
pub use transport::{CoreCommand, CoreProcess, CoreStreams, LineReader, ProcessState, Stream};
pub use ui::{JsonLineSink, UiSink};

#[cfg(test)]
mod tests;
