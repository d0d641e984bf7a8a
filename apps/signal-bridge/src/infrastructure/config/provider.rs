//! Endpoint Configuration Providers
//!
//! Adapters for the `ConfigProvider` port. The endpoint is read again for
//! every connection attempt, so a changed environment takes effect on the
//! next reconnect.

use super::settings::{ConfigError, EnvReader};
use crate::application::ports::ConfigProvider;
use crate::domain::connection::{EndpointConfig, TradingMode};

const SERVER_URL: &str = "BRIDGE_SERVER_URL";
const AUTH_SECRET: &str = "BRIDGE_AUTH_SECRET";
const TRADING_MODE: &str = "BRIDGE_TRADING_MODE";
const AUTO_RECONNECT: &str = "BRIDGE_AUTO_RECONNECT";

/// Reads the endpoint from `BRIDGE_*` environment variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvConfigProvider;

impl EnvConfigProvider {
    /// Create a provider over the process environment.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn endpoint(&self) -> Result<Option<EndpointConfig>, ConfigError> {
        endpoint_from_lookup(|key| std::env::var(key).ok())
    }
}

/// Resolve an endpoint from a key lookup.
///
/// Returns `Ok(None)` when the server URL or the secret is not set at all.
///
/// # Errors
///
/// Returns `EmptyValue` for blank required values and `InvalidValue` for an
/// unknown trading mode or an unparseable auto-reconnect flag.
pub fn endpoint_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<EndpointConfig>, ConfigError> {
    let env = EnvReader(&lookup);

    let (Some(server_url), Some(auth_secret)) = (env.raw(SERVER_URL), env.raw(AUTH_SECRET)) else {
        return Ok(None);
    };

    if server_url.trim().is_empty() {
        return Err(ConfigError::EmptyValue(SERVER_URL.to_string()));
    }
    if auth_secret.is_empty() {
        return Err(ConfigError::EmptyValue(AUTH_SECRET.to_string()));
    }

    let trading_mode = match env.raw(TRADING_MODE) {
        None => TradingMode::default(),
        Some(value) => TradingMode::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
            key: TRADING_MODE.to_string(),
            value,
        })?,
    };

    let auto_reconnect = match env.raw(AUTO_RECONNECT) {
        None => true,
        Some(value) => parse_flag(&value).ok_or_else(|| ConfigError::InvalidValue {
            key: AUTO_RECONNECT.to_string(),
            value,
        })?,
    };

    Ok(Some(EndpointConfig::new(
        server_url.trim(),
        auth_secret,
        trading_mode,
        auto_reconnect,
    )))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Serves a fixed endpoint, or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    endpoint: Option<EndpointConfig>,
}

impl StaticConfigProvider {
    /// Provider that always returns `endpoint`.
    #[must_use]
    pub const fn new(endpoint: EndpointConfig) -> Self {
        Self {
            endpoint: Some(endpoint),
        }
    }

    /// Provider with nothing stored.
    #[must_use]
    pub const fn empty() -> Self {
        Self { endpoint: None }
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn endpoint(&self) -> Result<Option<EndpointConfig>, ConfigError> {
        Ok(self.endpoint.clone())
    }
}
