//! Broker Adapters
//!
//! Implementations of the `OrderExecutor` port.

pub mod alpaca;

pub use alpaca::{AlpacaCredentials, AlpacaError, AlpacaExecutor};
