//! Heartbeat Monitor
//!
//! Asks the session to send a `heartbeat` frame on a fixed period while the
//! connection is authenticated and records the time of every `heartbeat_ack`.
//! The last acknowledgment is exposed for observability. An optional
//! acknowledgment timeout reports a stale connection so the session can
//! treat it as lost.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default period between heartbeat pings.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between ping messages.
    pub ping_interval: Duration,
    /// Maximum silence after a ping before the connection is considered
    /// dead. `None` disables the check.
    pub ack_timeout: Option<Duration>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_HEARTBEAT_INTERVAL,
            ack_timeout: None,
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, ack_timeout: Option<Duration>) -> Self {
        Self {
            ping_interval,
            ack_timeout,
        }
    }

    /// Create configuration from `WebSocketSettings`.
    #[must_use]
    pub const fn from_websocket_settings(settings: &crate::WebSocketSettings) -> Self {
        Self {
            ping_interval: settings.heartbeat_interval,
            ack_timeout: settings.heartbeat_timeout,
        }
    }
}

/// Events emitted by the heartbeat monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Request to send a heartbeat frame.
    SendPing,
    /// No acknowledgment within the configured timeout.
    Timeout,
}

/// Liveness state shared between the monitor and the session.
#[derive(Debug)]
pub struct HeartbeatState {
    last_ack: RwLock<Option<DateTime<Utc>>>,
    last_activity: RwLock<Instant>,
    waiting_for_ack: AtomicBool,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create new heartbeat state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_ack: RwLock::new(None),
            last_activity: RwLock::new(Instant::now()),
            waiting_for_ack: AtomicBool::new(false),
        }
    }

    /// Record an acknowledgment and return its timestamp.
    pub fn record_ack(&self) -> DateTime<Utc> {
        let now = Utc::now();
        *self.last_ack.write() = Some(now);
        *self.last_activity.write() = Instant::now();
        self.waiting_for_ack.store(false, Ordering::SeqCst);
        now
    }

    /// Mark that a ping went out.
    pub fn mark_ping_sent(&self) {
        self.waiting_for_ack.store(true, Ordering::SeqCst);
    }

    /// Check if a ping is awaiting its acknowledgment.
    #[must_use]
    pub fn is_waiting_for_ack(&self) -> bool {
        self.waiting_for_ack.load(Ordering::SeqCst)
    }

    /// Time of the last acknowledgment, if any.
    #[must_use]
    pub fn last_ack(&self) -> Option<DateTime<Utc>> {
        *self.last_ack.read()
    }

    /// Time since the last acknowledgment or since the monitor started.
    #[must_use]
    pub fn time_since_activity(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    /// Restart the silence clock; called when a new monitor starts.
    pub fn restart(&self) {
        *self.last_activity.write() = Instant::now();
        self.waiting_for_ack.store(false, Ordering::SeqCst);
    }

    /// Clear all liveness data; called when the connection goes away.
    pub fn reset(&self) {
        *self.last_ack.write() = None;
        self.restart();
    }
}

/// Heartbeat monitor for one authenticated connection.
///
/// # Example
///
/// ```rust,no_run
/// use signal_bridge::infrastructure::bridge::heartbeat::{
///     HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState,
/// };
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// async fn example() {
///     let state = Arc::new(HeartbeatState::new());
///     let (event_tx, mut event_rx) = mpsc::channel(4);
///     let cancel = CancellationToken::new();
///
///     let manager =
///         HeartbeatManager::new(HeartbeatConfig::default(), state.clone(), event_tx, cancel.clone());
///     tokio::spawn(manager.run());
///
///     while let Some(event) = event_rx.recv().await {
///         match event {
///             HeartbeatEvent::SendPing => state.mark_ping_sent(),
///             HeartbeatEvent::Timeout => break,
///         }
///     }
/// }
/// ```
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a new heartbeat manager.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run the monitoring loop until cancelled, the receiver is dropped or
    /// a timeout is reported. The first ping is due one period after start.
    pub async fn run(self) {
        self.state.restart();

        let period = if self.config.ping_interval.is_zero() {
            DEFAULT_HEARTBEAT_INTERVAL
        } else {
            self.config.ping_interval
        };
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat monitor cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if self.check_and_ping().await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Returns `Err(())` when the loop should exit.
    async fn check_and_ping(&self) -> Result<(), ()> {
        if let Some(timeout) = self.config.ack_timeout {
            let silence = self.state.time_since_activity();
            if self.state.is_waiting_for_ack() && silence > timeout {
                tracing::warn!(
                    silence_ms = u64::try_from(silence.as_millis()).unwrap_or(u64::MAX),
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Heartbeat acknowledgment overdue"
                );
                let _ = self.event_tx.send(HeartbeatEvent::Timeout).await;
                return Err(());
            }
        }

        if self.event_tx.send(HeartbeatEvent::SendPing).await.is_err() {
            tracing::debug!("Heartbeat receiver dropped, stopping monitor");
            return Err(());
        }

        Ok(())
    }
}
