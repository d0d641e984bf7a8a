//! Prometheus Metrics Module
//!
//! Exposes bridge client metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Signals**: Trade signals received and results sent, dropped or failed
//! - **Connection**: Session state, reconnect attempts, heartbeats
//! - **Protocol**: Inbound frames dropped by the codec
//! - **Latency**: Order execution duration
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before [`init_metrics`] is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ConnectionState;
use crate::domain::signal::TradeAction;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Repeated calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Signal pipeline
    describe_counter!(
        "bridge_signals_received_total",
        "Total trade signals received from the bridge"
    );
    describe_counter!(
        "bridge_results_sent_total",
        "Total trade results sent back to the bridge"
    );
    describe_counter!(
        "bridge_results_dropped_total",
        "Total trade results dropped because the transport was not open"
    );
    describe_histogram!(
        "bridge_execution_seconds",
        "Time spent placing an order for one signal"
    );

    // Connection
    describe_gauge!(
        "bridge_connection_state",
        "Current session state (1 for the active state label)"
    );
    describe_counter!(
        "bridge_reconnects_total",
        "Total reconnection attempts fired"
    );
    describe_counter!(
        "bridge_heartbeats_sent_total",
        "Total heartbeat pings sent"
    );
    describe_counter!(
        "bridge_heartbeats_acked_total",
        "Total heartbeat acknowledgments received"
    );

    // Protocol
    describe_counter!(
        "bridge_messages_dropped_total",
        "Total inbound frames dropped by reason"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for result outcomes.
#[derive(Debug, Clone, Copy)]
pub enum ResultOutcome {
    /// Order placed.
    Success,
    /// Execution failed.
    Failure,
}

impl ResultOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    /// Label for a result's success flag.
    #[must_use]
    pub const fn from_success(success: bool) -> Self {
        if success { Self::Success } else { Self::Failure }
    }
}

const STATES: [ConnectionState; 6] = [
    ConnectionState::Idle,
    ConnectionState::Connecting,
    ConnectionState::Authenticating,
    ConnectionState::Authenticated,
    ConnectionState::ReconnectScheduled,
    ConnectionState::Closed,
];

/// Record a trade signal received.
pub fn record_signal_received(action: TradeAction) {
    counter!(
        "bridge_signals_received_total",
        "action" => action.as_str()
    )
    .increment(1);
}

/// Record a trade result written to the transport.
pub fn record_result_sent(outcome: ResultOutcome) {
    counter!(
        "bridge_results_sent_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a trade result that could not be delivered.
pub fn record_result_dropped() {
    counter!("bridge_results_dropped_total").increment(1);
}

/// Record an inbound frame dropped before routing.
pub fn record_message_dropped(reason: &'static str) {
    counter!(
        "bridge_messages_dropped_total",
        "reason" => reason
    )
    .increment(1);
}

/// Publish the current session state as a one-hot gauge.
pub fn set_connection_state(state: ConnectionState) {
    for candidate in STATES {
        let value = if candidate == state { 1.0 } else { 0.0 };
        gauge!(
            "bridge_connection_state",
            "state" => candidate.as_str()
        )
        .set(value);
    }
}

/// Record a fired reconnection attempt.
pub fn record_reconnect() {
    counter!("bridge_reconnects_total").increment(1);
}

/// Record a heartbeat ping sent.
pub fn record_heartbeat_sent() {
    counter!("bridge_heartbeats_sent_total").increment(1);
}

/// Record a heartbeat acknowledgment.
pub fn record_heartbeat_acked() {
    counter!("bridge_heartbeats_acked_total").increment(1);
}

/// Record order execution duration.
pub fn record_execution_duration(duration: Duration) {
    histogram!("bridge_execution_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
