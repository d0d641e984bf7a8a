//! Bridge Client Handle
//!
//! [`BridgeClient`] is the control surface of one bridge session. The
//! session itself runs on a dedicated task that owns the WebSocket; the
//! handle talks to it over a command channel, reads the published status
//! snapshot, and receives lifecycle notifications as [`BridgeEvent`]s.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::session::{Command, Session};
use crate::application::ports::{ConfigProvider, OrderExecutor};
use crate::domain::connection::ConnectionStatus;
use crate::domain::signal::{TradeResult, TradeSignal};
use crate::infrastructure::config::{ConfigError, WebSocketSettings};

const COMMAND_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// Error Type
// =============================================================================

/// Errors returned by [`BridgeClient`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// No endpoint configuration is stored.
    #[error("bridge endpoint is not configured")]
    NotConfigured,

    /// Stored endpoint configuration is invalid.
    #[error("invalid bridge configuration: {0}")]
    Config(#[from] ConfigError),

    /// Writing to the transport failed.
    #[error("WebSocket error: {0}")]
    Transport(String),

    /// The transport closed or failed before the handshake completed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The bridge rejected the handshake.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Transport open plus handshake exceeded the configured bound.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// `disconnect()` was called while the connection attempt was pending.
    #[error("connection attempt cancelled")]
    Cancelled,

    /// The session task is no longer running.
    #[error("bridge client stopped")]
    ClientStopped,
}

// =============================================================================
// Events
// =============================================================================

/// Notifications published by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// Handshake accepted.
    Connected {
        /// Server-assigned client identifier.
        client_id: String,
    },
    /// Connection lost, rejected or closed.
    Disconnected {
        /// Server close reason or a synthesized description.
        reason: String,
        /// Delay until the next automatic attempt, if one is armed.
        retry_in: Option<Duration>,
    },
    /// A scheduled retry fired.
    Reconnecting {
        /// Attempt number since the last successful handshake.
        attempt: u32,
    },
    /// Heartbeat acknowledged.
    Heartbeat {
        /// Time the acknowledgment was received.
        at: DateTime<Utc>,
    },
    /// Trade signal received and handed to execution.
    SignalReceived(TradeSignal),
    /// Trade result produced (and sent, if the transport was open).
    TradeResult(TradeResult),
}

// =============================================================================
// Status Handle
// =============================================================================

/// Shared, read-only view of the session status.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle(Arc<RwLock<ConnectionStatus>>);

impl StatusHandle {
    /// Current status snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionStatus {
        self.0.read().clone()
    }

    pub(super) fn publish(&self, status: ConnectionStatus) {
        *self.0.write() = status;
    }
}

// =============================================================================
// Bridge Client
// =============================================================================

/// Handle to a running bridge session.
///
/// Dropping the handle stops the session.
pub struct BridgeClient {
    commands: mpsc::Sender<Command>,
    status: StatusHandle,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeClient {
    /// Spawn the session task. The session starts idle; call
    /// [`connect`](Self::connect) to open the connection.
    #[must_use]
    pub fn spawn(
        settings: &WebSocketSettings,
        config: Arc<dyn ConfigProvider>,
        executor: Arc<dyn OrderExecutor>,
        events: mpsc::Sender<BridgeEvent>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let status = StatusHandle::default();
        let cancel = CancellationToken::new();

        let session = Session::new(
            settings,
            config,
            executor,
            command_rx,
            events,
            status.clone(),
            cancel.clone(),
        );
        let task = tokio::spawn(session.run());

        Self {
            commands: command_tx,
            status,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Open and authenticate the connection.
    ///
    /// Resolves immediately if a connection is already open or being
    /// opened.
    ///
    /// # Errors
    ///
    /// Returns the reason the attempt failed: missing configuration,
    /// transport failure, rejected handshake, timeout or cancellation.
    pub async fn connect(&self) -> Result<(), BridgeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Connect(reply_tx))
            .await
            .map_err(|_| BridgeError::ClientStopped)?;
        reply_rx.await.map_err(|_| BridgeError::ClientStopped)?
    }

    /// Close the connection and cancel any pending retry. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `ClientStopped` if the session task has exited.
    pub async fn disconnect(&self) -> Result<(), BridgeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Disconnect(reply_tx))
            .await
            .map_err(|_| BridgeError::ClientStopped)?;
        reply_rx.await.map_err(|_| BridgeError::ClientStopped)
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status.snapshot()
    }

    /// Shareable status view, e.g. for the health server.
    #[must_use]
    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Stop the session task and wait for it to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Bridge session task ended abnormally");
            }
        }
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("status", &self.status.snapshot())
            .finish_non_exhaustive()
    }
}
