//! Paper Exchange
//!
//! In-memory venue used for dry running and tests. Market data is seeded by
//! the caller; limit orders fill instantly at the requested rate unless
//! instant fill is switched off, in which case orders rest until a helper
//! fills or cancels them. Quote balances are debited on buys and credited on
//! sell fills so a long dry run still books PnL.

use crate::domain::entities::market::{Candle, CandlePeriod, MarketSummary, Ticker};
use crate::domain::repositories::exchange_client::{
    Balance, ExchangeClient, ExchangeError, ExchangeResult, OrderInfo, OrderStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrderKind {
    Buy,
    Sell,
}

#[derive(Debug, Clone)]
struct PaperOrder {
    info: OrderInfo,
    kind: OrderKind,
}

#[derive(Default)]
struct PaperState {
    balances: HashMap<String, f64>,
    orders: HashMap<String, PaperOrder>,
    summaries: Vec<MarketSummary>,
    tickers: HashMap<String, Ticker>,
    candles: HashMap<String, Vec<Candle>>,
}

pub struct PaperExchange {
    instant_fill: AtomicBool,
    state: Mutex<PaperState>,
}

impl PaperExchange {
    pub fn new() -> Self {
        PaperExchange {
            instant_fill: AtomicBool::new(true),
            state: Mutex::new(PaperState::default()),
        }
    }

    /// Seed an account balance.
    pub async fn with_balance(self, currency: &str, amount: f64) -> Self {
        self.state
            .lock()
            .await
            .balances
            .insert(currency.to_uppercase(), amount);
        self
    }

    pub async fn set_summaries(&self, summaries: Vec<MarketSummary>) {
        self.state.lock().await.summaries = summaries;
    }

    pub async fn set_ticker(&self, market: &str, ticker: Ticker) {
        self.state.lock().await.tickers.insert(market.to_string(), ticker);
    }

    pub async fn set_candles(&self, market: &str, candles: Vec<Candle>) {
        self.state.lock().await.candles.insert(market.to_string(), candles);
    }

    /// When off, orders rest as `Open` until filled or cancelled by hand.
    pub fn set_instant_fill(&self, instant: bool) {
        self.instant_fill.store(instant, Ordering::SeqCst);
    }

    /// Fill a resting order at its limit price.
    pub async fn fill_order(&self, order_id: &str) -> ExchangeResult<()> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| ExchangeError::OrderStatusFailed(format!("Unknown order {}", order_id)))?;
        order.info.status = OrderStatus::Filled;
        order.info.time = Utc::now();
        let order = order.clone();
        Self::settle_fill(&mut state, &order);
        Ok(())
    }

    /// Fill a resting order at a different rate and quantity than requested,
    /// mimicking the venue reporting actual fill economics.
    pub async fn fill_order_at(
        &self,
        order_id: &str,
        rate: f64,
        quantity: f64,
        time: DateTime<Utc>,
    ) -> ExchangeResult<()> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| ExchangeError::OrderStatusFailed(format!("Unknown order {}", order_id)))?;
        order.info.status = OrderStatus::Filled;
        order.info.price = rate;
        order.info.original_quantity = quantity;
        order.info.time = time;
        let order = order.clone();
        Self::settle_fill(&mut state, &order);
        Ok(())
    }

    /// Report a resting order as partially filled.
    pub async fn mark_partially_filled(&self, order_id: &str) -> ExchangeResult<()> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| ExchangeError::OrderStatusFailed(format!("Unknown order {}", order_id)))?;
        order.info.status = OrderStatus::PartiallyFilled;
        Ok(())
    }

    fn quote_of(market: &str) -> String {
        market
            .split('/')
            .nth(1)
            .unwrap_or_default()
            .to_uppercase()
    }

    fn settle_fill(state: &mut PaperState, order: &PaperOrder) {
        if order.kind == OrderKind::Sell {
            let proceeds = order.info.price * order.info.original_quantity;
            let quote = Self::quote_of(&order.info.market);
            *state.balances.entry(quote).or_insert(0.0) += proceeds;
        }
    }

    async fn place(
        &self,
        market: &str,
        quantity: f64,
        rate: f64,
        kind: OrderKind,
    ) -> ExchangeResult<String> {
        let mut state = self.state.lock().await;

        if kind == OrderKind::Buy {
            let quote = Self::quote_of(market);
            let cost = quantity * rate;
            let available = state.balances.get(&quote).copied().unwrap_or(0.0);
            if available < cost {
                return Err(ExchangeError::OrderPlacementFailed(format!(
                    "Insufficient {} balance: {} < {}",
                    quote, available, cost
                )));
            }
            *state.balances.entry(quote).or_insert(0.0) -= cost;
        }

        let order_id = Uuid::new_v4().to_string();
        let status = if self.instant_fill.load(Ordering::SeqCst) {
            OrderStatus::Filled
        } else {
            OrderStatus::Open
        };
        let order = PaperOrder {
            info: OrderInfo {
                order_id: order_id.clone(),
                market: market.to_string(),
                status,
                original_quantity: quantity,
                price: rate,
                time: Utc::now(),
            },
            kind,
        };
        if status == OrderStatus::Filled {
            Self::settle_fill(&mut state, &order);
        }
        state.orders.insert(order_id.clone(), order);
        Ok(order_id)
    }
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    fn name(&self) -> &str {
        "paper"
    }

    async fn get_market_summaries(&self) -> ExchangeResult<Vec<MarketSummary>> {
        Ok(self.state.lock().await.summaries.clone())
    }

    async fn get_ticker(&self, market: &str) -> ExchangeResult<Ticker> {
        self.state
            .lock()
            .await
            .tickers
            .get(market)
            .copied()
            .ok_or_else(|| ExchangeError::MarketDataFailed(format!("No ticker for {}", market)))
    }

    async fn get_ticker_history(
        &self,
        market: &str,
        since: DateTime<Utc>,
        _period: CandlePeriod,
    ) -> ExchangeResult<Vec<Candle>> {
        let state = self.state.lock().await;
        let candles = state
            .candles
            .get(market)
            .ok_or_else(|| ExchangeError::MarketDataFailed(format!("No candles for {}", market)))?;
        Ok(candles
            .iter()
            .filter(|c| c.timestamp >= since)
            .copied()
            .collect())
    }

    async fn get_balance(&self, currency: &str) -> ExchangeResult<Balance> {
        let amount = self
            .state
            .lock()
            .await
            .balances
            .get(&currency.to_uppercase())
            .copied()
            .unwrap_or(0.0);
        Ok(Balance {
            currency: currency.to_uppercase(),
            available: amount,
            total: amount,
        })
    }

    async fn buy(&self, market: &str, quantity: f64, rate: f64) -> ExchangeResult<String> {
        self.place(market, quantity, rate, OrderKind::Buy).await
    }

    async fn sell(&self, market: &str, quantity: f64, rate: f64) -> ExchangeResult<String> {
        self.place(market, quantity, rate, OrderKind::Sell).await
    }

    async fn get_order(&self, order_id: &str, _market: &str) -> ExchangeResult<OrderInfo> {
        self.state
            .lock()
            .await
            .orders
            .get(order_id)
            .map(|order| order.info.clone())
            .ok_or_else(|| ExchangeError::OrderStatusFailed(format!("Unknown order {}", order_id)))
    }

    async fn cancel_order(&self, order_id: &str, _market: &str) -> ExchangeResult<()> {
        let mut state = self.state.lock().await;
        let order = state.orders.get_mut(order_id).ok_or_else(|| {
            ExchangeError::OrderCancellationFailed(format!("Unknown order {}", order_id))
        })?;
        if order.info.status == OrderStatus::Filled {
            return Err(ExchangeError::OrderCancellationFailed(format!(
                "Order {} already filled",
                order_id
            )));
        }
        order.info.status = OrderStatus::Cancelled;

        // Refund the reserved quote for an unfilled buy.
        if order.kind == OrderKind::Buy {
            let refund = order.info.price * order.info.original_quantity;
            let quote = Self::quote_of(&order.info.market);
            *state.balances.entry(quote).or_insert(0.0) += refund;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_instant_buy_fills_and_debits_quote() {
        let exchange = PaperExchange::new().with_balance("BTC", 0.02).await;

        let id = exchange.buy("ETH/BTC", 0.1942, 0.0515).await.unwrap();
        let order = exchange.get_order(&id, "ETH/BTC").await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);

        let balance = exchange.get_balance("BTC").await.unwrap();
        assert!((balance.available - (0.02 - 0.1942 * 0.0515)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_resting_order_lifecycle() {
        let exchange = PaperExchange::new().with_balance("BTC", 0.02).await;
        exchange.set_instant_fill(false);

        let id = exchange.buy("ETH/BTC", 0.19, 0.05).await.unwrap();
        let order = exchange.get_order(&id, "ETH/BTC").await.unwrap();
        assert_eq!(order.status, OrderStatus::Open);

        exchange.fill_order(&id).await.unwrap();
        let order = exchange.get_order(&id, "ETH/BTC").await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_cancel_refunds_unfilled_buy() {
        let exchange = PaperExchange::new().with_balance("BTC", 0.02).await;
        exchange.set_instant_fill(false);

        let id = exchange.buy("ETH/BTC", 0.19, 0.05).await.unwrap();
        let held = exchange.get_balance("BTC").await.unwrap();
        assert!(held.available < 0.02);

        exchange.cancel_order(&id, "ETH/BTC").await.unwrap();
        let refunded = exchange.get_balance("BTC").await.unwrap();
        assert!((refunded.available - 0.02).abs() < 1e-12);

        let order = exchange.get_order(&id, "ETH/BTC").await.unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_filled_order_fails() {
        let exchange = PaperExchange::new().with_balance("BTC", 0.02).await;
        let id = exchange.buy("ETH/BTC", 0.19, 0.05).await.unwrap();
        assert!(exchange.cancel_order(&id, "ETH/BTC").await.is_err());
    }

    #[tokio::test]
    async fn test_sell_fill_credits_proceeds() {
        let exchange = PaperExchange::new().with_balance("BTC", 0.0).await;
        let id = exchange.sell("ETH/BTC", 0.1942, 0.055).await.unwrap();
        let order = exchange.get_order(&id, "ETH/BTC").await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);

        let balance = exchange.get_balance("BTC").await.unwrap();
        assert!((balance.available - 0.1942 * 0.055).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejects_buy() {
        let exchange = PaperExchange::new().with_balance("BTC", 0.001).await;
        let result = exchange.buy("ETH/BTC", 0.19, 0.05).await;
        assert!(matches!(
            result,
            Err(ExchangeError::OrderPlacementFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_history_filters_by_since() {
        use chrono::TimeZone;
        let exchange = PaperExchange::new();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let candles: Vec<Candle> = (0..5)
            .map(|i| Candle {
                timestamp: start + chrono::Duration::minutes(30 * i),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
            })
            .collect();
        exchange.set_candles("ETH/BTC", candles).await;

        let since = start + chrono::Duration::minutes(60);
        let window = exchange
            .get_ticker_history("ETH/BTC", since, CandlePeriod::ThirtyMinutes)
            .await
            .unwrap();
        assert_eq!(window.len(), 3);
    }
}
