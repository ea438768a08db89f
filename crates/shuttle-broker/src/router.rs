//! Classification of inbound envelopes from the core and the UI.
//!
//! Core-originated envelopes may be answered locally, relayed to the UI, and
//! resolve a pending correlation, all from the same message. UI-originated
//! envelopes are either relayed to the core or answered locally with a
//! success payload; anything else is logged and dropped without a reply.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::dispatcher::CapabilityDispatcher;
use crate::envelope::{Envelope, generate_message_id, is_terminal, success_payload};
use crate::error::BrokerError;
use crate::queue::QueueHandle;
use crate::registry::{Continuation, CorrelationRegistry};
use crate::routing::RoutingTable;
use crate::ui::UiSink;

/// Log target for routing decisions.
pub(crate) const ROUTER_TARGET: &str = "shuttle_broker::router";

/// What happened to a core-originated envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreDisposition {
    /// A capability reply was queued back to the core.
    pub answered_locally: bool,
    /// The payload was relayed to the UI.
    pub forwarded_to_ui: bool,
    /// A pending correlation received the payload.
    pub resolved: bool,
}

impl CoreDisposition {
    /// Whether no rule applied.
    #[must_use]
    pub const fn is_unhandled(&self) -> bool {
        !(self.answered_locally || self.forwarded_to_ui || self.resolved)
    }
}

/// What happened to a UI-originated envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiDisposition {
    /// Relayed to the core under `message_id`.
    ForwardedToCore {
        /// The id used on the wire.
        message_id: String,
    },
    /// Answered by the dispatcher and replied to the UI under `message_id`.
    AnsweredLocally {
        /// The id used for the reply.
        message_id: String,
    },
    /// No rule applied; nothing was sent.
    Unrecognized,
}

/// The broker's routing policy.
pub struct MessageRouter {
    routes: Arc<RoutingTable>,
    dispatcher: CapabilityDispatcher,
    registry: Arc<CorrelationRegistry>,
    core: QueueHandle,
    ui: Arc<dyn UiSink>,
}

impl MessageRouter {
    /// Assembles a router over its collaborators.
    #[must_use]
    pub fn new(
        routes: Arc<RoutingTable>,
        dispatcher: CapabilityDispatcher,
        registry: Arc<CorrelationRegistry>,
        core: QueueHandle,
        ui: Arc<dyn UiSink>,
    ) -> Self {
        Self {
            routes,
            dispatcher,
            registry,
            core,
            ui,
        }
    }

    /// Decodes and routes one line read from the core.
    ///
    /// Malformed lines are logged and dropped; `None` is returned for them.
    pub fn handle_core_line(&self, line: &str) -> Option<CoreDisposition> {
        match Envelope::decode(line) {
            Ok(envelope) => Some(self.handle_core_message(envelope)),
            Err(error) => {
                warn!(target: ROUTER_TARGET, error = %error, "dropping undecodable core line");
                None
            }
        }
    }

    /// Routes one envelope received from the core.
    pub fn handle_core_message(&self, envelope: Envelope) -> CoreDisposition {
        let Envelope {
            message_type,
            message_id,
            data,
        } = envelope;
        let mut disposition = CoreDisposition::default();

        if self.routes.is_locally_handled(&message_type) {
            if let Some(result) = self.dispatcher.dispatch(&message_type, &data) {
                let reply = Envelope::new(message_type.clone(), message_id.clone(), result);
                disposition.answered_locally = self.enqueue_core(&reply);
            }
        }

        if self.routes.forwards_to_ui(&message_type) {
            self.ui.post(Envelope::new(
                message_type.clone(),
                message_id.clone(),
                data.clone(),
            ));
            disposition.forwarded_to_ui = true;
        }

        if let Some(id) = message_id.as_deref() {
            disposition.resolved = self.registry.resolve(id, &data, is_terminal(&data));
        }

        if disposition.is_unhandled() {
            warn!(
                target: ROUTER_TARGET,
                message_type = %message_type,
                message_id = ?message_id,
                "unhandled core message"
            );
        }
        disposition
    }

    /// Routes one envelope received from the UI.
    ///
    /// `continuation`, when given, receives every core response correlated
    /// with a forwarded request. It is ignored for locally answered types.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when a forwarded request cannot be registered
    /// or queued.
    pub fn handle_ui_message(
        &self,
        envelope: Envelope,
        continuation: Option<Continuation>,
    ) -> Result<UiDisposition, BrokerError> {
        let Envelope {
            message_type,
            message_id,
            data,
        } = envelope;

        if self.routes.forwards_to_core(&message_type) {
            let message_id = self.send_to_core(&message_type, data, message_id, continuation)?;
            return Ok(UiDisposition::ForwardedToCore { message_id });
        }

        if self.routes.is_ui_local(&message_type) {
            if let Some(result) = self.dispatcher.dispatch(&message_type, &data) {
                let message_id = message_id.unwrap_or_else(generate_message_id);
                self.ui.post(Envelope::new(
                    message_type,
                    Some(message_id.clone()),
                    success_payload(result),
                ));
                return Ok(UiDisposition::AnsweredLocally { message_id });
            }
        }

        warn!(
            target: ROUTER_TARGET,
            message_type = %message_type,
            message_id = ?message_id,
            "unrecognized UI message"
        );
        Ok(UiDisposition::Unrecognized)
    }

    /// Sends a request to the core, registering `continuation` for replies.
    ///
    /// A fresh id is generated when `message_id` is `None`. Returns the id
    /// used on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Registry`] for a duplicate id or a closed
    /// registry, [`BrokerError::Queue`] when the core's queue is closed, and
    /// [`BrokerError::Encode`] when `data` cannot be encoded.
    pub fn send_to_core(
        &self,
        message_type: &str,
        data: Value,
        message_id: Option<String>,
        continuation: Option<Continuation>,
    ) -> Result<String, BrokerError> {
        let message_id = message_id.unwrap_or_else(generate_message_id);
        let line = Envelope::new(message_type, Some(message_id.clone()), data).encode()?;

        let registered = match continuation {
            Some(continuation) => {
                self.registry.register(message_id.clone(), continuation)?;
                true
            }
            None => false,
        };

        if let Err(error) = self.core.enqueue(line) {
            if registered {
                self.registry.deregister(&message_id);
            }
            return Err(error.into());
        }

        debug!(
            target: ROUTER_TARGET,
            message_type,
            message_id = %message_id,
            correlated = registered,
            "sent to core"
        );
        Ok(message_id)
    }

    /// The correlation registry shared with the broker.
    #[must_use]
    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    fn enqueue_core(&self, envelope: &Envelope) -> bool {
        let outcome = envelope
            .encode()
            .map_err(BrokerError::from)
            .and_then(|line| self.core.enqueue(line).map_err(BrokerError::from));
        match outcome {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    target: ROUTER_TARGET,
                    message_type = %envelope.message_type,
                    error = %error,
                    "failed to reply to core"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("dispatcher", &self.dispatcher)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
