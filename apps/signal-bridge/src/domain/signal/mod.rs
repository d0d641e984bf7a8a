//! Trade Signal Types
//!
//! A trade signal is an instruction pushed by the bridge to buy or sell a
//! quantity of a symbol, tagged with the trading pair and leg it belongs to.
//! Every received signal produces exactly one [`TradeResult`].
//!
//! # Wire Format (JSON)
//! ```json
//! {
//!   "type": "trade",
//!   "action": "BUY",
//!   "symbol": "ABC",
//!   "quantity": 10,
//!   "orderType": "limit",
//!   "limitPrice": 12.5,
//!   "pairId": 1,
//!   "side": "base"
//! }
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Signal Components
// =============================================================================

/// Direction of a trade signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    /// Open or add to a long position.
    Buy,
    /// Reduce or open a short position.
    Sell,
}

impl TradeAction {
    /// Wire representation (`BUY` / `SELL`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    /// Lower-case order side as brokers expect it.
    #[must_use]
    pub const fn as_order_side(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type requested by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    /// Execute at the prevailing market price.
    Market,
    /// Execute at `limitPrice` or better.
    Limit,
}

impl OrderKind {
    /// Wire representation (`market` / `limit`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Limit => "limit",
        }
    }
}

/// Leg of the trading pair a signal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairSide {
    /// Base leg.
    Base,
    /// Quote leg.
    Quote,
}

// =============================================================================
// Trade Signal
// =============================================================================

/// Trade instruction received from the bridge.
///
/// Signals are immutable once received and are echoed back verbatim inside
/// the result message so the bridge can correlate them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSignal {
    /// Buy or sell.
    pub action: TradeAction,
    /// Instrument symbol.
    pub symbol: String,
    /// Quantity to trade (must be positive).
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    /// Market or limit.
    pub order_type: OrderKind,
    /// Limit price, present iff `order_type` is `limit`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub limit_price: Option<Decimal>,
    /// Trading pair this signal belongs to.
    pub pair_id: u64,
    /// Leg of the pair.
    pub side: PairSide,
}

impl TradeSignal {
    /// Check the signal's semantic constraints.
    ///
    /// # Errors
    ///
    /// Returns a [`SignalError`] if the quantity is not positive or the limit
    /// price does not match the order type.
    pub fn validate(&self) -> Result<(), SignalError> {
        if self.symbol.trim().is_empty() {
            return Err(SignalError::EmptySymbol);
        }
        if self.quantity <= Decimal::ZERO {
            return Err(SignalError::NonPositiveQuantity(self.quantity));
        }
        match (self.order_type, self.limit_price) {
            (OrderKind::Limit, None) => Err(SignalError::MissingLimitPrice),
            (OrderKind::Limit, Some(price)) if price <= Decimal::ZERO => {
                Err(SignalError::NonPositiveLimitPrice(price))
            }
            (OrderKind::Market, Some(_)) => Err(SignalError::UnexpectedLimitPrice),
            _ => Ok(()),
        }
    }
}

/// Reasons a received signal cannot be executed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// Symbol is blank.
    #[error("invalid signal: symbol is empty")]
    EmptySymbol,
    /// Quantity is zero or negative.
    #[error("invalid signal: quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),
    /// Limit order without a limit price.
    #[error("invalid signal: limit order requires limitPrice")]
    MissingLimitPrice,
    /// Limit price is zero or negative.
    #[error("invalid signal: limitPrice must be positive, got {0}")]
    NonPositiveLimitPrice(Decimal),
    /// Market order carrying a limit price.
    #[error("invalid signal: market order must not carry limitPrice")]
    UnexpectedLimitPrice,
}

// =============================================================================
// Trade Result
// =============================================================================

/// Outcome of executing a single signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeOutcome {
    /// Broker accepted the order.
    Placed {
        /// Broker-assigned order identifier.
        order_id: String,
    },
    /// Execution failed.
    Failed {
        /// Human-readable failure description.
        error: String,
    },
}

/// Result reported back to the bridge for one received signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeResult {
    /// What happened.
    pub outcome: TradeOutcome,
    /// The signal this result answers, unchanged.
    pub signal: TradeSignal,
}

impl TradeResult {
    /// Result for an order the broker accepted.
    #[must_use]
    pub fn placed(signal: TradeSignal, order_id: impl Into<String>) -> Self {
        Self {
            outcome: TradeOutcome::Placed {
                order_id: order_id.into(),
            },
            signal,
        }
    }

    /// Result for a signal that could not be executed.
    #[must_use]
    pub fn failed(signal: TradeSignal, error: impl Into<String>) -> Self {
        Self {
            outcome: TradeOutcome::Failed {
                error: error.into(),
            },
            signal,
        }
    }

    /// Whether the order was placed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, TradeOutcome::Placed { .. })
    }

    /// Broker order id, if placed.
    #[must_use]
    pub fn order_id(&self) -> Option<&str> {
        match &self.outcome {
            TradeOutcome::Placed { order_id } => Some(order_id),
            TradeOutcome::Failed { .. } => None,
        }
    }

    /// Failure description, if failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            TradeOutcome::Placed { .. } => None,
            TradeOutcome::Failed { error } => Some(error),
        }
    }
}
