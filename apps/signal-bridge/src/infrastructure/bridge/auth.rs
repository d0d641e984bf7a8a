//! Bridge Authentication
//!
//! The bridge expects an `auth` message as the first frame after the
//! transport opens and answers with `auth_success` (carrying the client id)
//! or `auth_failed` (carrying the rejection text).
//!
//! # Authentication Flow
//!
//! 1. Open the WebSocket to `<server>/bridge`
//! 2. Send `{"type":"auth","payload":{"secret":"...","version":"1.0.0","tradingMode":"paper"}}`
//! 3. Receive `{"type":"auth_success","payload":{"clientId":"..."}}` or
//!    `{"type":"auth_failed","payload":{"error":"..."}}`
//!
//! The handshake, including transport open, is bounded by
//! [`DEFAULT_HANDSHAKE_TIMEOUT`] unless configured otherwise.

use std::time::Duration;

use thiserror::Error;

use super::messages::{AuthFailed, AuthPayload, AuthSuccess, OutgoingMessage};
use crate::domain::connection::EndpointConfig;

// =============================================================================
// Constants
// =============================================================================

/// Protocol version announced in the handshake.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Default bound on transport open plus the auth round trip.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The bridge rejected the handshake.
    #[error("{0}")]
    Rejected(String),

    /// `auth_success` arrived without a usable client id.
    #[error("authentication succeeded without a client id")]
    MissingClientId,

    /// A handshake reply arrived outside of the handshake.
    #[error("unexpected handshake reply in state {0:?}")]
    UnexpectedReply(AuthState),
}

// =============================================================================
// Authentication State
// =============================================================================

/// Current state of authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// No handshake started on the current transport.
    #[default]
    Idle,

    /// Authentication request sent, awaiting response.
    Authenticating,

    /// Successfully authenticated.
    Authenticated,

    /// Authentication failed.
    Failed,
}

impl AuthState {
    /// Check if currently authenticated.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Check if authentication is in progress.
    #[must_use]
    pub const fn is_authenticating(&self) -> bool {
        matches!(self, Self::Authenticating)
    }
}

// =============================================================================
// Authentication Handler
// =============================================================================

/// Tracks the handshake on one transport.
#[derive(Debug, Default)]
pub struct AuthHandler {
    state: AuthState,
}

impl AuthHandler {
    /// Create a handler in the idle state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AuthState::Idle,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Build the `auth` message for `endpoint` and mark the handshake started.
    pub fn create_auth_request<'a>(&mut self, endpoint: &'a EndpointConfig) -> OutgoingMessage<'a> {
        self.state = AuthState::Authenticating;
        OutgoingMessage::Auth {
            payload: AuthPayload {
                secret: endpoint.auth_secret.expose(),
                version: PROTOCOL_VERSION,
                trading_mode: endpoint.trading_mode,
            },
        }
    }

    /// Handle `auth_success`, returning the client id.
    ///
    /// # Errors
    ///
    /// Returns an error if no handshake is in progress or the id is blank.
    pub fn on_success(&mut self, reply: AuthSuccess) -> Result<String, AuthError> {
        if !self.state.is_authenticating() {
            return Err(AuthError::UnexpectedReply(self.state));
        }
        if reply.client_id.trim().is_empty() {
            self.state = AuthState::Failed;
            return Err(AuthError::MissingClientId);
        }
        self.state = AuthState::Authenticated;
        Ok(reply.client_id)
    }

    /// Handle `auth_failed`, returning the rejection.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedReply` if no handshake is in progress.
    pub fn on_failure(&mut self, reply: AuthFailed) -> Result<AuthError, AuthError> {
        if !self.state.is_authenticating() {
            return Err(AuthError::UnexpectedReply(self.state));
        }
        self.state = AuthState::Failed;
        Ok(AuthError::Rejected(reply.error))
    }

    /// Forget the handshake; called whenever the transport goes away.
    pub const fn reset(&mut self) {
        self.state = AuthState::Idle;
    }
}
