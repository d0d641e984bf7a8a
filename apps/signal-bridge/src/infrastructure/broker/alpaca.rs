//! Alpaca Markets order executor.
//!
//! Places one order per trade signal through the Alpaca REST API. The
//! trading mode picks both the key pair and the endpoint:
//!
//! - Paper: `https://paper-api.alpaca.markets`
//! - Live: `https://api.alpaca.markets`
//!
//! Requests are never retried here; a failure is reported back to the
//! bridge as a failed trade result.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::ports::{ExecutionError, OrderExecutor, PlacedOrder};
use crate::domain::connection::TradingMode;
use crate::domain::signal::TradeSignal;
use crate::infrastructure::config::ConfigError;

/// Paper trading REST endpoint.
pub const PAPER_BASE_URL: &str = "https://paper-api.alpaca.markets";

/// Live trading REST endpoint.
pub const LIVE_BASE_URL: &str = "https://api.alpaca.markets";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Errors
// =============================================================================

/// Errors from the Alpaca adapter.
#[derive(Debug, Error)]
pub enum AlpacaError {
    /// Non-success HTTP status.
    #[error("Alpaca API error: {status} - {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// Request could not be sent or the response could not be read.
    #[error("Network error: {0}")]
    Network(String),

    /// Response body did not match the expected shape.
    #[error("JSON parsing error: {0}")]
    JsonParse(String),

    /// No credentials for the selected trading mode.
    #[error("missing Alpaca credentials for {0} trading")]
    MissingCredentials(&'static str),
}

impl From<reqwest::Error> for AlpacaError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for AlpacaError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonParse(err.to_string())
    }
}

impl From<AlpacaError> for ExecutionError {
    fn from(err: AlpacaError) -> Self {
        Self::new(err.to_string())
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// One API key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKeyPair {
    key_id: String,
    secret_key: String,
}

impl ApiKeyPair {
    /// Create a key pair.
    #[must_use]
    pub fn new(key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl std::fmt::Debug for ApiKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyPair")
            .field("key_id", &"[REDACTED]")
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Paper and live key pairs; either may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlpacaCredentials {
    /// Paper trading keys.
    pub paper: Option<ApiKeyPair>,
    /// Live trading keys.
    pub live: Option<ApiKeyPair>,
}

impl AlpacaCredentials {
    /// Read `ALPACA_PAPER_KEY`/`ALPACA_PAPER_SECRET` and
    /// `ALPACA_LIVE_KEY`/`ALPACA_LIVE_SECRET`.
    ///
    /// # Errors
    ///
    /// Returns `EmptyValue` if a variable is set but blank.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `EmptyValue` if a variable is set but blank.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let pair = |key_var: &str, secret_var: &str| -> Result<Option<ApiKeyPair>, ConfigError> {
            match (lookup(key_var), lookup(secret_var)) {
                (Some(key), Some(secret)) => {
                    if key.trim().is_empty() {
                        return Err(ConfigError::EmptyValue(key_var.to_string()));
                    }
                    if secret.trim().is_empty() {
                        return Err(ConfigError::EmptyValue(secret_var.to_string()));
                    }
                    Ok(Some(ApiKeyPair::new(key.trim(), secret.trim())))
                }
                _ => Ok(None),
            }
        };

        Ok(Self {
            paper: pair("ALPACA_PAPER_KEY", "ALPACA_PAPER_SECRET")?,
            live: pair("ALPACA_LIVE_KEY", "ALPACA_LIVE_SECRET")?,
        })
    }

    /// Key pair for a trading mode.
    #[must_use]
    pub const fn for_mode(&self, mode: TradingMode) -> Option<&ApiKeyPair> {
        match mode {
            TradingMode::Paper => self.paper.as_ref(),
            TradingMode::Live => self.live.as_ref(),
        }
    }
}

// =============================================================================
// API Types
// =============================================================================

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    symbol: &'a str,
    qty: String,
    side: &'static str,
    #[serde(rename = "type")]
    order_type: &'static str,
    time_in_force: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<String>,
}

impl<'a> OrderRequest<'a> {
    fn from_signal(signal: &'a TradeSignal) -> Self {
        Self {
            symbol: &signal.symbol,
            qty: signal.quantity.normalize().to_string(),
            side: signal.action.as_order_side(),
            order_type: signal.order_type.as_str(),
            time_in_force: "day",
            limit_price: signal.limit_price.map(|p| p.normalize().to_string()),
        }
    }
}

/// Order as returned by `POST /v2/orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaOrder {
    /// Order id.
    pub id: String,
    /// Order status (`accepted`, `new`, ...).
    pub status: String,
    /// Symbol.
    #[serde(default)]
    pub symbol: String,
}

/// Account summary from `GET /v2/account`.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaAccount {
    /// Account id.
    pub id: String,
    /// Account status (e.g. `ACTIVE`).
    pub status: String,
    /// Buying power.
    #[serde(with = "rust_decimal::serde::str")]
    pub buying_power: Decimal,
    /// Total equity.
    #[serde(with = "rust_decimal::serde::str")]
    pub equity: Decimal,
}

/// Open position from `GET /v2/positions`.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaPosition {
    /// Symbol.
    pub symbol: String,
    /// Signed quantity.
    #[serde(with = "rust_decimal::serde::str")]
    pub qty: Decimal,
    /// `long` or `short`.
    pub side: String,
    /// Current market value.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub market_value: Option<Decimal>,
    /// Average entry price.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub avg_entry_price: Option<Decimal>,
    /// Unrealized profit and loss.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub unrealized_pl: Option<Decimal>,
}

// =============================================================================
// Executor
// =============================================================================

/// Alpaca REST client implementing [`OrderExecutor`].
#[derive(Debug, Clone)]
pub struct AlpacaExecutor {
    keys: ApiKeyPair,
    trading_mode: TradingMode,
    base_url: String,
    client: Client,
}

impl AlpacaExecutor {
    /// Create an executor for `trading_mode` using the matching key pair.
    ///
    /// # Errors
    ///
    /// Returns an error if no keys exist for the mode or the HTTP client
    /// cannot be built.
    pub fn new(credentials: &AlpacaCredentials, trading_mode: TradingMode) -> Result<Self, AlpacaError> {
        let keys = credentials
            .for_mode(trading_mode)
            .cloned()
            .ok_or(AlpacaError::MissingCredentials(trading_mode.as_str()))?;

        let base_url = if trading_mode.is_live() {
            LIVE_BASE_URL
        } else {
            PAPER_BASE_URL
        };

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AlpacaError::Network(e.to_string()))?;

        Ok(Self {
            keys,
            trading_mode,
            base_url: base_url.to_string(),
            client,
        })
    }

    /// Point the executor at a different endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Trading mode this executor places orders in.
    #[must_use]
    pub const fn trading_mode(&self) -> TradingMode {
        self.trading_mode
    }

    /// Place an order for `signal`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn place_order(&self, signal: &TradeSignal) -> Result<AlpacaOrder, AlpacaError> {
        tracing::info!(
            action = %signal.action,
            quantity = %signal.quantity,
            symbol = %signal.symbol,
            trading_mode = self.trading_mode.as_str(),
            "Submitting order to Alpaca"
        );

        let body = OrderRequest::from_signal(signal);
        let order: AlpacaOrder = self
            .send(self.request(Method::POST, "/v2/orders").json(&body))
            .await?;

        tracing::info!(order_id = %order.id, status = %order.status, "Alpaca order placed");
        Ok(order)
    }

    /// Fetch the account summary.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn account(&self) -> Result<AlpacaAccount, AlpacaError> {
        self.send(self.request(Method::GET, "/v2/account")).await
    }

    /// Fetch open positions.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn positions(&self) -> Result<Vec<AlpacaPosition>, AlpacaError> {
        self.send(self.request(Method::GET, "/v2/positions")).await
    }

    /// Verify credentials by fetching the account.
    ///
    /// # Errors
    ///
    /// Returns the underlying request error.
    pub async fn check_connection(&self) -> Result<AlpacaAccount, AlpacaError> {
        let account = self.account().await?;
        tracing::info!(
            account_id = %account.id,
            status = %account.status,
            buying_power = %account.buying_power,
            equity = %account.equity,
            trading_mode = self.trading_mode.as_str(),
            "Alpaca connection verified"
        );
        Ok(account)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("APCA-API-KEY-ID", &self.keys.key_id)
            .header("APCA-API-SECRET-KEY", &self.keys.secret_key)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AlpacaError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AlpacaError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl OrderExecutor for AlpacaExecutor {
    async fn execute(&self, signal: &TradeSignal) -> Result<PlacedOrder, ExecutionError> {
        let order = self.place_order(signal).await?;
        Ok(PlacedOrder {
            id: order.id,
            status: order.status,
        })
    }
}
