//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `OrderExecutor`: places an order for a trade signal at the broker
//! - `ConfigProvider`: supplies the endpoint configuration for a connection attempt

use async_trait::async_trait;

use crate::domain::connection::EndpointConfig;
use crate::domain::signal::TradeSignal;
use crate::infrastructure::config::ConfigError;

/// Order accepted by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    /// Broker-assigned order identifier.
    pub id: String,
    /// Broker order status at acceptance (e.g. `accepted`, `new`).
    pub status: String,
}

/// Execution failure carrying a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ExecutionError {
    message: String,
}

impl ExecutionError {
    /// Create an execution error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure text reported back to the bridge.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Places orders for trade signals.
///
/// Called exactly once per received signal. Implementations must not retry
/// internally; the result is reported as-is.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// Place an order for `signal`.
    async fn execute(&self, signal: &TradeSignal) -> Result<PlacedOrder, ExecutionError>;
}

/// Supplies the endpoint configuration.
///
/// `Ok(None)` means no configuration has been stored yet, which makes
/// `connect()` fail with `NotConfigured`.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigProvider: Send + Sync {
    /// Load the current endpoint configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a stored configuration is present but invalid.
    fn endpoint(&self) -> Result<Option<EndpointConfig>, ConfigError>;
}
