//! Exchange Client Trait
//!
//! This module defines the `ExchangeClient` trait, the single interface the
//! trade manager uses to talk to a venue. The engine never depends on a
//! concrete exchange implementation; live and simulated venues both sit
//! behind this trait, which also makes the order/reconciliation paths easy
//! to exercise in tests.

use crate::domain::entities::market::{Candle, CandlePeriod, MarketSummary, Ticker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Common result type for exchange operations.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Errors that can occur during exchange operations.
#[derive(Debug, Error, Clone)]
pub enum ExchangeError {
    #[error("Order placement failed: {0}")]
    OrderPlacementFailed(String),

    #[error("Order cancellation failed: {0}")]
    OrderCancellationFailed(String),

    #[error("Order status query failed: {0}")]
    OrderStatusFailed(String),

    #[error("Balance query failed: {0}")]
    BalanceQueryFailed(String),

    #[error("Market data query failed: {0}")]
    MarketDataFailed(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out")]
    Timeout,
}

/// Account balance for one currency.
#[derive(Debug, Clone)]
pub struct Balance {
    pub currency: String,
    pub available: f64,
    pub total: f64,
}

/// Order status as reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "OPEN"),
            OrderStatus::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A venue-side view of one order.
#[derive(Debug, Clone)]
pub struct OrderInfo {
    pub order_id: String,
    pub market: String,
    pub status: OrderStatus,
    pub original_quantity: f64,
    /// Limit price for resting orders, fill price once closed.
    pub price: f64,
    /// Fill or close time for terminal orders, placement time otherwise.
    pub time: DateTime<Utc>,
}

/// Venue operations the trade manager consumes.
///
/// Implementations must enforce a per-call deadline; a call that exceeds it
/// resolves to `ExchangeError::Timeout` so the current cycle can abandon the
/// action and retry on the next tick.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Get the name of this exchange.
    fn name(&self) -> &str;

    /// List all markets with their 24h volume and currency pair.
    async fn get_market_summaries(&self) -> ExchangeResult<Vec<MarketSummary>>;

    /// Current top-of-book quote for a market.
    async fn get_ticker(&self, market: &str) -> ExchangeResult<Ticker>;

    /// Candle history for a market, newest last.
    async fn get_ticker_history(
        &self,
        market: &str,
        since: DateTime<Utc>,
        period: CandlePeriod,
    ) -> ExchangeResult<Vec<Candle>>;

    /// Balance for a single currency.
    async fn get_balance(&self, currency: &str) -> ExchangeResult<Balance>;

    /// Place a limit buy. Returns the venue-assigned order id.
    async fn buy(&self, market: &str, quantity: f64, rate: f64) -> ExchangeResult<String>;

    /// Place a limit sell. Returns the venue-assigned order id.
    async fn sell(&self, market: &str, quantity: f64, rate: f64) -> ExchangeResult<String>;

    /// Fetch the current state of an order.
    async fn get_order(&self, order_id: &str, market: &str) -> ExchangeResult<OrderInfo>;

    /// Cancel an outstanding order.
    async fn cancel_order(&self, order_id: &str, market: &str) -> ExchangeResult<()>;
}
