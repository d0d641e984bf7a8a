//! Connection Types
//!
//! Endpoint configuration, lifecycle states and the status snapshot exposed
//! to observers of the bridge session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resource path of the bridge stream on the configured server.
pub const BRIDGE_PATH: &str = "/bridge";

// =============================================================================
// Trading Mode
// =============================================================================

/// Trading environment the bridge session operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    /// Paper trading (simulated fills).
    #[default]
    Paper,
    /// Live trading (real money).
    Live,
}

impl TradingMode {
    /// Parse `paper` or `live`, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "paper" => Some(Self::Paper),
            "live" => Some(Self::Live),
            _ => None,
        }
    }

    /// Check if this is live trading.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Get the mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Live => "live",
        }
    }
}

// =============================================================================
// Endpoint Configuration
// =============================================================================

/// Shared secret presented to the bridge during the handshake.
///
/// `Debug` redacts the value so the secret never reaches the logs.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSecret(String);

impl AuthSecret {
    /// Wrap a secret value.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Get the raw secret for the wire.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthSecret([REDACTED])")
    }
}

/// Where and how to connect to the bridge.
///
/// Loaded fresh for every connection attempt and immutable for its duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Server address (`http(s)://` or `ws(s)://`).
    pub server_url: String,
    /// Shared authentication secret.
    pub auth_secret: AuthSecret,
    /// Paper or live.
    pub trading_mode: TradingMode,
    /// Whether lost connections are retried automatically.
    pub auto_reconnect: bool,
}

impl EndpointConfig {
    /// Create a new endpoint configuration.
    #[must_use]
    pub fn new(
        server_url: impl Into<String>,
        auth_secret: impl Into<String>,
        trading_mode: TradingMode,
        auto_reconnect: bool,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            auth_secret: AuthSecret::new(auth_secret),
            trading_mode,
            auto_reconnect,
        }
    }

    /// WebSocket URL of the bridge stream.
    ///
    /// `http` becomes `ws` and `https` becomes `wss`; addresses that already
    /// use a WebSocket scheme are kept. The bridge path is appended.
    #[must_use]
    pub fn stream_url(&self) -> String {
        let trimmed = self.server_url.trim().trim_end_matches('/');
        let base = trimmed
            .strip_prefix("http")
            .map_or_else(|| trimmed.to_string(), |rest| format!("ws{rest}"));
        format!("{base}{BRIDGE_PATH}")
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of the bridge session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Never connected, or stopped by `disconnect()`.
    #[default]
    Idle,
    /// Transport is opening.
    Connecting,
    /// Transport open, waiting for the handshake result.
    Authenticating,
    /// Handshake accepted; signals flow.
    Authenticated,
    /// Transport lost, retry timer armed.
    ReconnectScheduled,
    /// Transport lost or rejected, no retry pending.
    Closed,
}

impl ConnectionState {
    /// Whether a connection attempt is running or established.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Authenticating | Self::Authenticated
        )
    }

    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::ReconnectScheduled => "reconnect_scheduled",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// True only while authenticated with a client id.
    pub connected: bool,
    /// Server-assigned client id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Time of the last heartbeat acknowledgment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful handshake.
    pub reconnect_attempts: u32,
}
