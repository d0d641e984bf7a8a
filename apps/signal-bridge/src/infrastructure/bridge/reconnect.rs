//! Reconnect Scheduler
//!
//! Exponential backoff for lost bridge connections. The delay for a retry is
//! `min(initial * multiplier^attempt, max)` where `attempt` is the number of
//! retries already fired since the last successful handshake. The attempt
//! counter advances when a retry fires, not when it is scheduled, and once it
//! reaches the configured maximum no further retry is armed.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each attempt).
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// Maximum number of retries (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter_factor: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter_factor,
            max_attempts,
        }
    }

    /// Create configuration from `WebSocketSettings`.
    #[must_use]
    pub const fn from_websocket_settings(settings: &crate::WebSocketSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter_factor: settings.reconnect_jitter,
            max_attempts: settings.max_reconnect_attempts,
        }
    }

    /// Backoff delay for a given attempt number, without jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let max_millis = self.max_delay.as_millis();

        #[allow(clippy::cast_precision_loss)]
        let base = self.initial_delay.as_millis() as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = (base * self.multiplier.powi(exponent)).round();

        let millis = if !scaled.is_finite() {
            max_millis
        } else if scaled <= 0.0 {
            0
        } else {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let scaled = scaled as u128;
            scaled.min(max_millis)
        };

        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}

/// Retry timer and attempt counter owned by the bridge session.
///
/// # Example
///
/// ```rust
/// use signal_bridge::infrastructure::bridge::reconnect::{ReconnectConfig, ReconnectScheduler};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut scheduler = ReconnectScheduler::new(ReconnectConfig::default());
///
/// // Transport lost: arm the first retry.
/// assert_eq!(scheduler.schedule(), Some(Duration::from_secs(1)));
///
/// // Timer elapsed: count the attempt and reconnect.
/// assert_eq!(scheduler.fire(), 1);
///
/// // Handshake succeeded.
/// scheduler.reset();
/// assert_eq!(scheduler.attempt_count(), 0);
/// # }
/// ```
#[derive(Debug)]
pub struct ReconnectScheduler {
    config: ReconnectConfig,
    attempt_count: u32,
    deadline: Option<Instant>,
}

impl ReconnectScheduler {
    /// Create a scheduler with no retry pending.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
            deadline: None,
        }
    }

    /// Arm the retry timer.
    ///
    /// Returns the delay, or `None` when the attempt limit has been reached,
    /// in which case nothing is armed.
    pub fn schedule(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            self.deadline = None;
            return None;
        }

        let delay = self.apply_jitter(self.config.delay_for(self.attempt_count));
        self.deadline = Some(Instant::now() + delay);
        Some(delay)
    }

    /// Consume the elapsed timer and count the attempt.
    ///
    /// Returns the updated attempt count.
    pub const fn fire(&mut self) -> u32 {
        self.deadline = None;
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.attempt_count
    }

    /// Disarm a pending retry without touching the counter.
    pub const fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Reset after a successful handshake.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
        self.deadline = None;
    }

    /// When the pending retry is due.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether a retry is armed.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Retries fired since the last successful handshake.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Configured attempt limit (0 = unlimited).
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Check if another retry may be scheduled.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if !self.config.jitter_factor.is_finite() || self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}
