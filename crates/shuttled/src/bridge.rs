//! Newline-delimited JSON UI transport over a pair of byte streams.
//!
//! The host's stdin carries UI envelopes towards the broker and its stdout
//! carries envelopes back. Outbound traffic has its own [`WriteQueue`], so
//! responses to the UI never contend with writes to the core.

use std::io::{Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde_json::Value;
use tracing::{debug, warn};

use shuttle_broker::{
    Broker, Continuation, Envelope, JsonLineSink, LineReader, Stream, UiSink, WriteQueue,
    generate_message_id,
};

const BRIDGE_TARGET: &str = "shuttled::bridge";

/// Owns the UI-bound write queue and the UI reader thread.
#[derive(Debug)]
pub struct StdioUiBridge {
    queue: WriteQueue,
    sink: Arc<JsonLineSink>,
}

impl StdioUiBridge {
    /// Starts the UI-bound writer over `output`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when the writer thread cannot be spawned.
    pub fn new<W>(output: W, warn_threshold: usize) -> std::io::Result<Self>
    where
        W: Write + Send + 'static,
    {
        let queue = WriteQueue::spawn("ui-out", output, warn_threshold)?;
        let sink = Arc::new(JsonLineSink::new(queue.handle()));
        Ok(Self { queue, sink })
    }

    /// The sink the broker posts UI-bound envelopes to.
    #[must_use]
    pub fn sink(&self) -> Arc<dyn UiSink> {
        Arc::clone(&self.sink) as Arc<dyn UiSink>
    }

    /// Starts reading UI envelopes from `input` and feeding them to `broker`.
    ///
    /// `on_eof` runs once when `input` ends or fails.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when the reader thread cannot be spawned.
    pub fn pump<R, F>(
        &self,
        input: R,
        broker: Arc<Broker>,
        on_eof: F,
    ) -> std::io::Result<JoinHandle<()>>
    where
        R: Read + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let sink = Arc::clone(&self.sink);
        thread::Builder::new()
            .name(String::from("shuttle-ui-in"))
            .spawn(move || {
                read_ui(input, &broker, &sink);
                on_eof();
            })
    }

    /// Flushes everything already posted and stops the writer.
    pub fn finish(&self) {
        self.queue.finish();
    }
}

fn read_ui<R: Read>(input: R, broker: &Broker, sink: &Arc<JsonLineSink>) {
    for line in LineReader::new(input, Stream::Stdin) {
        let line = match line {
            Ok(line) => line,
            Err(error) => {
                warn!(target: BRIDGE_TARGET, error = %error, "UI input failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let mut envelope = match Envelope::decode(&line) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(target: BRIDGE_TARGET, error = %error, "dropping malformed UI line");
                continue;
            }
        };

        let message_id = envelope
            .message_id
            .get_or_insert_with(generate_message_id)
            .clone();
        let continuation = relay(Arc::clone(sink), envelope.message_type.clone(), message_id);
        match broker.handle_ui_message(envelope, Some(continuation)) {
            Ok(disposition) => {
                debug!(target: BRIDGE_TARGET, disposition = ?disposition, "UI message handled");
            }
            Err(error) => {
                warn!(target: BRIDGE_TARGET, error = %error, "UI message rejected");
            }
        }
    }
    debug!(target: BRIDGE_TARGET, "UI input closed");
}

/// Posts every correlated core reply back to the UI under the request's id.
fn relay(sink: Arc<JsonLineSink>, message_type: String, message_id: String) -> Continuation {
    Box::new(move |data: &Value| {
        sink.post(Envelope::new(
            message_type.clone(),
            Some(message_id.clone()),
            data.clone(),
        ));
    })
}
