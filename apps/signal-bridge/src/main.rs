//! Signal Bridge Binary
//!
//! Connects to the signal bridge, executes received trade signals through
//! Alpaca, and reports results back until shut down.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin signal-bridge
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `BRIDGE_SERVER_URL`: Bridge server address (`http(s)://` or `ws(s)://`)
//! - `BRIDGE_AUTH_SECRET`: Shared authentication secret
//! - `ALPACA_PAPER_KEY` / `ALPACA_PAPER_SECRET`: Paper trading keys, or
//!   `ALPACA_LIVE_KEY` / `ALPACA_LIVE_SECRET` for live mode
//!
//! ## Optional
//! - `BRIDGE_TRADING_MODE`: paper | live (default: paper)
//! - `BRIDGE_AUTO_RECONNECT`: Retry lost connections (default: true)
//! - `BRIDGE_HEARTBEAT_INTERVAL_SECS`: Heartbeat period (default: 15)
//! - `BRIDGE_HEARTBEAT_TIMEOUT_SECS`: Ack timeout, 0 disables (default: 0)
//! - `BRIDGE_RECONNECT_DELAY_INITIAL_MS`: First retry delay (default: 1000)
//! - `BRIDGE_RECONNECT_DELAY_MAX_MS`: Retry delay cap (default: 30000)
//! - `BRIDGE_RECONNECT_MULTIPLIER`: Backoff multiplier (default: 2.0)
//! - `BRIDGE_RECONNECT_JITTER`: Jitter factor 0.0-1.0 (default: 0.0)
//! - `BRIDGE_MAX_RECONNECT_ATTEMPTS`: Retry limit, 0 is unlimited (default: 10)
//! - `BRIDGE_HANDSHAKE_TIMEOUT_SECS`: Connect plus auth timeout (default: 10)
//! - `BRIDGE_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: signal-bridge)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use signal_bridge::infrastructure::health::{HealthServer, HealthServerState};
use signal_bridge::infrastructure::telemetry;
use signal_bridge::{
    AlpacaCredentials, AlpacaExecutor, BridgeClient, BridgeEvent, BridgeSettings, ConfigProvider,
    EnvConfigProvider, TradeOutcome, TradingMode, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the bridge event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let telemetry_guard = telemetry::init();

    tracing::info!(
        otlp_export = telemetry_guard.is_exporting(),
        "Starting Signal Bridge"
    );

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let settings = BridgeSettings::from_env();
    log_settings(&settings);

    let config_provider: Arc<dyn ConfigProvider> = Arc::new(EnvConfigProvider::new());
    let trading_mode = config_provider
        .endpoint()?
        .map_or(TradingMode::Paper, |endpoint| endpoint.trading_mode);

    let credentials = AlpacaCredentials::from_env()?;
    let executor = AlpacaExecutor::new(&credentials, trading_mode)
        .with_context(|| format!("no broker credentials for {} trading", trading_mode.as_str()))?;

    match executor.check_connection().await {
        Ok(account) => tracing::info!(
            mode = trading_mode.as_str(),
            account = %account.id,
            status = %account.status,
            buying_power = %account.buying_power,
            "Broker connection verified"
        ),
        Err(e) => tracing::warn!(mode = trading_mode.as_str(), error = %e, "Broker connection check failed"),
    }

    let shutdown_token = CancellationToken::new();
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let client = BridgeClient::spawn(
        &settings.websocket,
        config_provider,
        Arc::new(executor),
        event_tx,
    );

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        client.status_handle(),
    ));
    if settings.server.health_port == 0 {
        tracing::info!("Health server disabled");
    } else {
        let health_server = HealthServer::new(
            settings.server.health_port,
            health_state,
            shutdown_token.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    let event_logger = tokio::spawn(log_events(event_rx));

    if let Err(e) = client.connect().await {
        tracing::error!(error = %e, "Initial bridge connection failed");
    }

    tracing::info!("Signal bridge ready");

    await_shutdown(shutdown_token).await;

    let stop = async {
        if let Err(e) = client.disconnect().await {
            tracing::warn!(error = %e, "Disconnect failed");
        }
        client.shutdown().await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, stop).await.is_err() {
        tracing::warn!("Bridge client did not stop in time");
    }
    event_logger.abort();

    tracing::info!("Signal bridge stopped");
    Ok(())
}

/// Log bridge events until the client is dropped.
async fn log_events(mut rx: mpsc::Receiver<BridgeEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            BridgeEvent::Connected { client_id } => {
                tracing::info!(client_id = %client_id, "Bridge connected");
            }
            BridgeEvent::Disconnected { reason, retry_in } => {
                tracing::warn!(
                    reason = %reason,
                    retry_in_ms = retry_in.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
                    "Bridge disconnected"
                );
            }
            BridgeEvent::Reconnecting { attempt } => {
                tracing::info!(attempt, "Bridge reconnecting");
            }
            BridgeEvent::Heartbeat { at } => {
                tracing::trace!(at = %at, "Heartbeat acknowledged");
            }
            BridgeEvent::SignalReceived(signal) => {
                tracing::info!(
                    action = signal.action.as_str(),
                    symbol = %signal.symbol,
                    quantity = %signal.quantity,
                    pair_id = signal.pair_id,
                    "Signal received"
                );
            }
            BridgeEvent::TradeResult(result) => match result.outcome {
                TradeOutcome::Placed { order_id } => {
                    tracing::info!(symbol = %result.signal.symbol, order_id = %order_id, "Order placed");
                }
                TradeOutcome::Failed { error } => {
                    tracing::warn!(symbol = %result.signal.symbol, error = %error, "Order failed");
                }
            },
        }
    }
}

/// Log the parsed settings.
fn log_settings(settings: &BridgeSettings) {
    let ws = &settings.websocket;
    tracing::info!(
        heartbeat_interval_secs = ws.heartbeat_interval.as_secs(),
        reconnect_delay_initial_ms = u64::try_from(ws.reconnect_delay_initial.as_millis()).unwrap_or(u64::MAX),
        reconnect_delay_max_ms = u64::try_from(ws.reconnect_delay_max.as_millis()).unwrap_or(u64::MAX),
        max_reconnect_attempts = ws.max_reconnect_attempts,
        health_port = settings.server.health_port,
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
