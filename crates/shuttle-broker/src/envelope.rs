//! The `{messageType, messageId, data}` unit exchanged on every boundary.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::DecodeError;

/// A single protocol message.
///
/// `message_id` joins a request to its response(s). An absent id means the
/// sender expects no correlation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Selects routing and the local handler.
    pub message_type: String,
    /// Correlation key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Opaque payload.
    pub data: Value,
}

impl Envelope {
    /// Builds an envelope.
    #[must_use]
    pub fn new(message_type: impl Into<String>, message_id: Option<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            message_id,
            data,
        }
    }

    /// Decodes one wire line.
    ///
    /// A missing `data` field decodes as `null`. Numeric ids are accepted and
    /// kept in their textual form.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the line is blank, is not JSON, is not an
    /// object, or lacks a string `messageType`.
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(DecodeError::Empty);
        }

        let value: Value =
            serde_json::from_str(trimmed).map_err(|source| DecodeError::InvalidJson {
                line: trimmed.to_owned(),
                source: Arc::new(source),
            })?;
        let Value::Object(mut fields) = value else {
            return Err(DecodeError::NotAnObject {
                line: trimmed.to_owned(),
            });
        };

        let Some(Value::String(message_type)) = fields.remove("messageType") else {
            return Err(DecodeError::MissingMessageType {
                line: trimmed.to_owned(),
            });
        };

        Ok(Self {
            message_type,
            message_id: take_message_id(&mut fields),
            data: fields.remove("data").unwrap_or(Value::Null),
        })
    }

    /// Encodes the envelope as a single line without a terminator.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `data` cannot be encoded.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Whether `data` carries the terminal marker.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        is_terminal(&self.data)
    }
}

fn take_message_id(fields: &mut Map<String, Value>) -> Option<String> {
    match fields.remove("messageId") {
        Some(Value::String(id)) => Some(id),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    }
}

/// Returns `true` iff `data.done` is the boolean `true`.
#[must_use]
pub fn is_terminal(data: &Value) -> bool {
    data.get("done").and_then(Value::as_bool).unwrap_or(false)
}

/// Wraps a locally computed result in the UI response shape.
#[must_use]
pub fn success_payload(content: Value) -> Value {
    json!({
        "status": "success",
        "content": content,
        "done": true,
    })
}

/// Generates a fresh correlation id.
#[must_use]
pub fn generate_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
