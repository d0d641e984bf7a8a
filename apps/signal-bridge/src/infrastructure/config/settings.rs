//! Bridge Configuration Settings
//!
//! Runtime tuning for the bridge client, loaded from environment variables.
//! Every value has a default; malformed values fall back to it.

use std::time::Duration;

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Silence after a ping before the connection is considered dead
    /// (`None` = never).
    pub heartbeat_timeout: Option<Duration>,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Jitter fraction applied to reconnection delays.
    pub reconnect_jitter: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Bound on transport open plus the auth round trip.
    pub handshake_timeout: Duration,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_timeout: None,
            reconnect_delay_initial: Duration::from_millis(1000),
            reconnect_delay_max: Duration::from_millis(30_000),
            reconnect_delay_multiplier: 2.0,
            reconnect_jitter: 0.0,
            max_reconnect_attempts: 10,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete bridge client settings.
#[derive(Debug, Clone, Default)]
pub struct BridgeSettings {
    /// WebSocket connection settings.
    pub websocket: WebSocketSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl BridgeSettings {
    /// Create settings from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create settings from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = EnvReader(&lookup);
        let defaults = WebSocketSettings::default();

        let websocket = WebSocketSettings {
            heartbeat_interval: env.nonzero_secs(
                "BRIDGE_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            ),
            heartbeat_timeout: env
                .parse::<u64>("BRIDGE_HEARTBEAT_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            reconnect_delay_initial: env.duration_millis(
                "BRIDGE_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.duration_millis(
                "BRIDGE_RECONNECT_DELAY_MAX_MS",
                defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env
                .parse("BRIDGE_RECONNECT_MULTIPLIER")
                .unwrap_or(defaults.reconnect_delay_multiplier),
            reconnect_jitter: env
                .parse::<f64>("BRIDGE_RECONNECT_JITTER")
                .filter(|factor| (0.0..=1.0).contains(factor))
                .unwrap_or(defaults.reconnect_jitter),
            max_reconnect_attempts: env
                .parse("BRIDGE_MAX_RECONNECT_ATTEMPTS")
                .unwrap_or(defaults.max_reconnect_attempts),
            handshake_timeout: env.nonzero_secs(
                "BRIDGE_HANDSHAKE_TIMEOUT_SECS",
                defaults.handshake_timeout,
            ),
        };

        let server = ServerSettings {
            health_port: env
                .parse("BRIDGE_HEALTH_PORT")
                .unwrap_or(ServerSettings::default().health_port),
        };

        Self { websocket, server }
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

/// Typed reads over a key lookup.
pub(super) struct EnvReader<'a, F: Fn(&str) -> Option<String>>(pub(super) &'a F);

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    pub(super) fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.raw(key).and_then(|v| v.trim().parse().ok())
    }

    /// Whole seconds; zero falls back to the default.
    fn nonzero_secs(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key)
            .filter(|secs| *secs > 0)
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key).map_or(default, Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn websocket_settings_defaults() {
        let settings = WebSocketSettings::default();
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(settings.heartbeat_timeout, None);
        assert_eq!(settings.reconnect_delay_initial, Duration::from_millis(1000));
        assert_eq!(settings.reconnect_delay_max, Duration::from_millis(30_000));
        assert!((settings.reconnect_delay_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(settings.max_reconnect_attempts, 10);
        assert_eq!(settings.handshake_timeout, Duration::from_secs(10));
    }

    #[test]
    fn server_settings_defaults() {
        assert_eq!(ServerSettings::default().health_port, 8083);
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let settings = BridgeSettings::from_lookup(lookup(&[]));
        assert_eq!(settings.websocket.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(settings.websocket.max_reconnect_attempts, 10);
        assert_eq!(settings.server.health_port, 8083);
    }

    #[test]
    fn overrides_are_applied() {
        let settings = BridgeSettings::from_lookup(lookup(&[
            ("BRIDGE_HEARTBEAT_INTERVAL_SECS", "5"),
            ("BRIDGE_HEARTBEAT_TIMEOUT_SECS", "20"),
            ("BRIDGE_RECONNECT_DELAY_INITIAL_MS", "250"),
            ("BRIDGE_RECONNECT_DELAY_MAX_MS", "4000"),
            ("BRIDGE_RECONNECT_MULTIPLIER", "1.5"),
            ("BRIDGE_MAX_RECONNECT_ATTEMPTS", "0"),
            ("BRIDGE_HANDSHAKE_TIMEOUT_SECS", "3"),
            ("BRIDGE_HEALTH_PORT", "0"),
        ]));

        let ws = &settings.websocket;
        assert_eq!(ws.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(ws.heartbeat_timeout, Some(Duration::from_secs(20)));
        assert_eq!(ws.reconnect_delay_initial, Duration::from_millis(250));
        assert_eq!(ws.reconnect_delay_max, Duration::from_millis(4000));
        assert!((ws.reconnect_delay_multiplier - 1.5).abs() < f64::EPSILON);
        assert_eq!(ws.max_reconnect_attempts, 0);
        assert_eq!(ws.handshake_timeout, Duration::from_secs(3));
        assert_eq!(settings.server.health_port, 0);
    }

    #[test]
    fn malformed_values_fall_back() {
        let settings = BridgeSettings::from_lookup(lookup(&[
            ("BRIDGE_HEARTBEAT_INTERVAL_SECS", "soon"),
            ("BRIDGE_MAX_RECONNECT_ATTEMPTS", "-1"),
            ("BRIDGE_HEARTBEAT_TIMEOUT_SECS", "0"),
        ]));
        assert_eq!(settings.websocket.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(settings.websocket.max_reconnect_attempts, 10);
        assert_eq!(settings.websocket.heartbeat_timeout, None);
    }

    #[test]
    fn zero_heartbeat_interval_and_handshake_timeout_fall_back() {
        let settings = BridgeSettings::from_lookup(lookup(&[
            ("BRIDGE_HEARTBEAT_INTERVAL_SECS", "0"),
            ("BRIDGE_HANDSHAKE_TIMEOUT_SECS", "0"),
        ]));
        assert_eq!(settings.websocket.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(settings.websocket.handshake_timeout, Duration::from_secs(10));
    }

    #[test]
    fn jitter_outside_unit_range_falls_back() {
        for raw in ["NaN", "inf", "-inf", "-0.5", "1.5"] {
            let settings =
                BridgeSettings::from_lookup(lookup(&[("BRIDGE_RECONNECT_JITTER", raw)]));
            assert!(settings.websocket.reconnect_jitter.abs() < f64::EPSILON, "{raw}");
        }

        let settings = BridgeSettings::from_lookup(lookup(&[("BRIDGE_RECONNECT_JITTER", "0.25")]));
        assert!((settings.websocket.reconnect_jitter - 0.25).abs() < f64::EPSILON);
    }
}
