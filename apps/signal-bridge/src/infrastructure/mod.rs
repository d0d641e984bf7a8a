//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Bridge protocol client (WebSocket session, auth, heartbeat, reconnect).
pub mod bridge;

/// Broker adapters implementing order execution.
pub mod broker;

/// Configuration loading and providers.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
