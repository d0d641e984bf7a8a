//! Configuration Module
//!
//! Settings loading and endpoint providers for the bridge client.

mod provider;
mod settings;

pub use provider::{EnvConfigProvider, StaticConfigProvider, endpoint_from_lookup};
pub use settings::{BridgeSettings, ConfigError, ServerSettings, WebSocketSettings};
