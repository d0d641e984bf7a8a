#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Signal Bridge - Trade Signal Bridge Client
//!
//! Keeps one authenticated WebSocket session open to a remote signal
//! bridge, executes every trade signal it pushes against the broker, and
//! reports each outcome back over the same session.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Core bridge types
//!   - `signal`: Trade signals and execution results
//!   - `connection`: Endpoint configuration and session lifecycle
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Order executor and configuration provider interfaces
//!   - `services`: Signal execution pipeline
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `bridge`: WebSocket session, auth handshake, heartbeat, reconnect
//!   - `broker`: Alpaca REST order executor
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! Bridge WS --trade--> Session --dispatch--> SignalPipeline --> OrderExecutor
//!     ^                                            |
//!     +------------------ trade_result <-----------+
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core bridge types.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{
    AuthSecret, ConnectionState, ConnectionStatus, EndpointConfig, TradingMode,
};
pub use domain::signal::{
    OrderKind, PairSide, SignalError, TradeAction, TradeOutcome, TradeResult, TradeSignal,
};

// Ports and services
pub use application::ports::{
    ConfigProvider, ExecutionError, OrderExecutor, PlacedOrder,
};
pub use application::services::{SignalPipeline, execute_signal};

// Infrastructure config
pub use infrastructure::config::{
    BridgeSettings, ConfigError, EnvConfigProvider, ServerSettings, StaticConfigProvider,
    WebSocketSettings,
};

// Bridge client
pub use infrastructure::bridge::{BridgeClient, BridgeError, BridgeEvent, StatusHandle};

// Broker
pub use infrastructure::broker::{AlpacaCredentials, AlpacaError, AlpacaExecutor};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
