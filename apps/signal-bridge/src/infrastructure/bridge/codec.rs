//! Bridge Message Codec
//!
//! JSON encoding and decoding for the bridge stream. Decoding inspects the
//! `type` tag first and only then deserializes the matching shape, so an
//! unknown tag is reported as such instead of falling through to a default.

use super::messages::{AuthFailed, AuthSuccess, BridgeMessage, Envelope, OutgoingMessage};
use crate::domain::signal::TradeSignal;

/// Tag field name on every frame.
const TAG_FIELD: &str = "type";

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

impl CodecError {
    /// Short label used for the dropped-message metric.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Json(_) => "malformed_json",
            Self::UnknownMessageType(_) => "unknown_type",
            Self::InvalidFormat(_) => "invalid_format",
        }
    }
}

/// JSON codec for the bridge stream.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into a [`BridgeMessage`].
    ///
    /// Frames without a tag are read as trade signals.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object, the tag is not a
    /// known string, or the payload does not match the tagged shape.
    pub fn decode(&self, text: &str) -> Result<BridgeMessage, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        if !value.is_object() {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}",
                truncate(text.trim(), 50)
            )));
        }

        let tag = match value.get(TAG_FIELD) {
            None => None,
            Some(serde_json::Value::String(tag)) => Some(tag.clone()),
            Some(other) => {
                return Err(CodecError::InvalidFormat(format!(
                    "message tag must be a string, got: {other}"
                )));
            }
        };

        let message = match tag.as_deref() {
            Some("auth_success") => {
                let m: Envelope<AuthSuccess> = serde_json::from_value(value)?;
                BridgeMessage::AuthSuccess(m.payload)
            }
            Some("auth_failed") => {
                let m: Envelope<AuthFailed> = serde_json::from_value(value)?;
                BridgeMessage::AuthFailed(m.payload)
            }
            Some("heartbeat_ack") => BridgeMessage::HeartbeatAck,
            Some("trade") | None => {
                let signal: TradeSignal = serde_json::from_value(value)?;
                BridgeMessage::Trade(signal)
            }
            Some(other) => return Err(CodecError::UnknownMessageType(other.to_string())),
        };

        Ok(message)
    }

    /// Encode an outgoing message as JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, message: &OutgoingMessage<'_>) -> Result<String, CodecError> {
        Ok(serde_json::to_string(message)?)
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(idx, _)| &text[..idx])
}
