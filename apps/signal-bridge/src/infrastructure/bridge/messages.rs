//! Bridge Wire Messages
//!
//! Every frame is a JSON text message discriminated by a `type` field.
//! Control messages carry their data under `payload`; trade signals carry
//! their fields at the top level.
//!
//! # Outgoing
//! ```json
//! {"type":"auth","payload":{"secret":"...","version":"1.0.0","tradingMode":"paper"}}
//! {"type":"heartbeat"}
//! {"type":"trade_result","payload":{"success":true,"orderId":"O123","signal":{...}}}
//! ```
//!
//! # Incoming
//! ```json
//! {"type":"auth_success","payload":{"clientId":"c-42"}}
//! {"type":"auth_failed","payload":{"error":"invalid secret"}}
//! {"type":"heartbeat_ack"}
//! {"type":"trade","action":"BUY","symbol":"ABC","quantity":10,...}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::connection::TradingMode;
use crate::domain::signal::{TradeOutcome, TradeResult, TradeSignal};

// =============================================================================
// Outgoing Messages
// =============================================================================

/// Message sent from the client to the bridge.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage<'a> {
    /// Authentication request, sent once the transport opens.
    Auth {
        /// Handshake data.
        payload: AuthPayload<'a>,
    },
    /// Liveness ping.
    Heartbeat,
    /// Outcome of one executed signal.
    TradeResult {
        /// Result data.
        payload: TradeResultPayload<'a>,
    },
}

impl<'a> OutgoingMessage<'a> {
    /// Build a `trade_result` message borrowing from `result`.
    #[must_use]
    pub fn trade_result(result: &'a TradeResult) -> Self {
        let (success, order_id, error) = match &result.outcome {
            TradeOutcome::Placed { order_id } => (true, Some(order_id.as_str()), None),
            TradeOutcome::Failed { error } => (false, None, Some(error.as_str())),
        };
        Self::TradeResult {
            payload: TradeResultPayload {
                success,
                order_id,
                error,
                signal: TaggedSignal {
                    kind: "trade",
                    signal: &result.signal,
                },
            },
        }
    }

    /// Wire tag of this message.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Heartbeat => "heartbeat",
            Self::TradeResult { .. } => "trade_result",
        }
    }
}

/// Payload of the `auth` message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload<'a> {
    /// Shared secret.
    pub secret: &'a str,
    /// Protocol version string.
    pub version: &'a str,
    /// Trading mode of this session.
    pub trading_mode: TradingMode,
}

/// Payload of the `trade_result` message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResultPayload<'a> {
    /// Whether the order was placed.
    pub success: bool,
    /// Broker order id on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<&'a str>,
    /// Failure text on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
    /// The answered signal, echoed as received.
    pub signal: TaggedSignal<'a>,
}

/// A trade signal serialized with its `type: "trade"` tag.
#[derive(Debug, Clone, Serialize)]
pub struct TaggedSignal<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    signal: &'a TradeSignal,
}

// =============================================================================
// Incoming Messages
// =============================================================================

/// Message received from the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeMessage {
    /// Handshake accepted.
    AuthSuccess(AuthSuccess),
    /// Handshake rejected.
    AuthFailed(AuthFailed),
    /// Reply to a heartbeat ping.
    HeartbeatAck,
    /// Trade instruction.
    Trade(TradeSignal),
}

impl BridgeMessage {
    /// Wire tag of this message.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AuthSuccess(_) => "auth_success",
            Self::AuthFailed(_) => "auth_failed",
            Self::HeartbeatAck => "heartbeat_ack",
            Self::Trade(_) => "trade",
        }
    }
}

/// Payload of `auth_success`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSuccess {
    /// Server-assigned client identifier.
    pub client_id: String,
}

/// Payload of `auth_failed`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthFailed {
    /// Server-supplied rejection text.
    pub error: String,
}

/// `{"payload": ...}` wrapper shared by control messages.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub payload: T,
}
