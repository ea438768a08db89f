//! The push channel towards the UI.

use tracing::warn;

use crate::envelope::Envelope;
use crate::queue::QueueHandle;

/// Log target for UI-bound traffic.
const UI_TARGET: &str = "shuttle_broker::ui";

/// Receives envelopes bound for the UI.
///
/// Implementations must not block; they are called from the core's reader
/// thread and from UI callers.
pub trait UiSink: Send + Sync {
    /// Delivers one envelope to the UI.
    fn post(&self, envelope: Envelope);
}

/// Writes UI-bound envelopes as JSON lines through a write queue.
#[derive(Debug, Clone)]
pub struct JsonLineSink {
    queue: QueueHandle,
}

impl JsonLineSink {
    /// Wraps the queue feeding the UI transport.
    #[must_use]
    pub const fn new(queue: QueueHandle) -> Self {
        Self { queue }
    }
}

impl UiSink for JsonLineSink {
    fn post(&self, envelope: Envelope) {
        let line = match envelope.encode() {
            Ok(line) => line,
            Err(error) => {
                warn!(
                    target: UI_TARGET,
                    message_type = %envelope.message_type,
                    error = %error,
                    "failed to encode UI envelope"
                );
                return;
            }
        };
        if let Err(error) = self.queue.enqueue(line) {
            warn!(
                target: UI_TARGET,
                message_type = %envelope.message_type,
                error = %error,
                "dropping UI envelope"
            );
        }
    }
}
