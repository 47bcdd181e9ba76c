//! Trade Entity
//!
//! A `Trade` is one round-trip position attempt owned by a trader slot. It
//! moves through buying, held, selling and closed/cancelled states driven by
//! order fills reported by the exchange. Every mutation keeps the persisted
//! invariants intact:
//!
//! - `is_open` exactly mirrors an unset `close_date`
//! - while buying, `open_order_id` points at the buy order
//! - while selling, `open_order_id` points at the sell order
//! - a trade is never buying and selling at the same time

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Partition tag for trade rows.
pub const TRADE_PARTITION: &str = "TRADE";

/// Why (or whether) a trade was sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SellType {
    None,
    StopLoss,
    TrailingStopLoss,
    TrailingStopLossUpdated,
    Timed,
    Strategy,
    Immediate,
    Cancelled,
}

impl SellType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SellType::None => "none",
            SellType::StopLoss => "stop_loss",
            SellType::TrailingStopLoss => "trailing_stop_loss",
            SellType::TrailingStopLossUpdated => "trailing_stop_loss_updated",
            SellType::Timed => "timed",
            SellType::Strategy => "strategy",
            SellType::Immediate => "immediate",
            SellType::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "none" => Ok(SellType::None),
            "stop_loss" => Ok(SellType::StopLoss),
            "trailing_stop_loss" => Ok(SellType::TrailingStopLoss),
            "trailing_stop_loss_updated" => Ok(SellType::TrailingStopLossUpdated),
            "timed" => Ok(SellType::Timed),
            "strategy" => Ok(SellType::Strategy),
            "immediate" => Ok(SellType::Immediate),
            "cancelled" => Ok(SellType::Cancelled),
            other => Err(format!("Unknown sell type: {}", other)),
        }
    }
}

impl std::fmt::Display for SellType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One position attempt against a single market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Stable identity, derived from a descending timestamp so that the
    /// natural row-key sort places the newest trade first.
    pub row_key: String,
    /// The trader slot that owns this position.
    pub trader_id: String,
    pub market: String,
    /// Quote-currency amount committed to the position.
    pub stake_amount: f64,
    pub open_rate: f64,
    pub close_rate: Option<f64>,
    /// Base-currency units received after fees.
    pub quantity: f64,
    pub close_profit: Option<f64>,
    pub close_profit_percentage: Option<f64>,
    pub buy_order_id: Option<String>,
    pub sell_order_id: Option<String>,
    /// The order currently outstanding on the venue, if any.
    pub open_order_id: Option<String>,
    pub open_date: DateTime<Utc>,
    pub close_date: Option<DateTime<Utc>>,
    pub is_open: bool,
    pub is_buying: bool,
    pub is_selling: bool,
    pub stop_loss_rate: Option<f64>,
    pub strategy_used: String,
    pub sell_type: SellType,
}

/// Row key with the given instant subtracted from the maximum timestamp, so
/// lexicographic ascending order is newest-first.
pub fn descending_row_key(at: DateTime<Utc>) -> String {
    let nanos = at
        .timestamp_nanos_opt()
        .unwrap_or_else(|| at.timestamp_millis().saturating_mul(1_000_000));
    format!("{:019}", i64::MAX - nanos)
}

impl Trade {
    /// Create a trade for a freshly placed buy order.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        trader_id: &str,
        market: &str,
        stake_amount: f64,
        open_rate: f64,
        quantity: f64,
        buy_order_id: &str,
        strategy_used: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Trade {
            row_key: descending_row_key(now),
            trader_id: trader_id.to_string(),
            market: market.to_string(),
            stake_amount,
            open_rate,
            close_rate: None,
            quantity,
            close_profit: None,
            close_profit_percentage: None,
            buy_order_id: Some(buy_order_id.to_string()),
            sell_order_id: None,
            open_order_id: Some(buy_order_id.to_string()),
            open_date: now,
            close_date: None,
            is_open: true,
            is_buying: true,
            is_selling: false,
            stop_loss_rate: None,
            strategy_used: strategy_used.to_string(),
            sell_type: SellType::None,
        }
    }

    /// There is an outstanding buy order to reconcile.
    pub fn has_open_buy_order(&self) -> bool {
        self.open_order_id.is_some() && self.sell_order_id.is_none()
    }

    /// There is an outstanding sell order to reconcile.
    pub fn has_open_sell_order(&self) -> bool {
        self.open_order_id.is_some() && self.sell_order_id.is_some()
    }

    /// The position is held outright, or only has a pre-placed immediate
    /// sell on the book. These are the trades sell decisions apply to.
    pub fn awaits_sell_decision(&self) -> bool {
        self.is_open && (self.open_order_id.is_none() || self.sell_type == SellType::Immediate)
    }

    /// Unrealized return at the given bid, as a ratio of the open rate.
    pub fn profit_ratio(&self, current_bid: f64) -> f64 {
        (current_bid - self.open_rate) / self.open_rate
    }

    /// Adopt the actual economics of a filled buy order.
    pub fn apply_buy_fill(&mut self, fill_quantity: f64, fill_rate: f64, fill_time: DateTime<Utc>) {
        self.stake_amount = fill_quantity * fill_rate;
        self.quantity = fill_quantity;
        self.open_rate = fill_rate;
        self.open_date = fill_time;
        self.is_buying = false;
        self.open_order_id = None;
    }

    /// Record a sell order placed on the venue.
    pub fn attach_sell_order(&mut self, order_id: &str, rate: f64, sell_type: SellType) {
        self.close_rate = Some(rate);
        self.sell_order_id = Some(order_id.to_string());
        self.open_order_id = Some(order_id.to_string());
        self.is_selling = true;
        self.sell_type = sell_type;
    }

    /// Forget a sell order that was cancelled on the venue, returning the
    /// trade to its held state.
    pub fn detach_sell_order(&mut self) {
        self.sell_order_id = None;
        self.open_order_id = None;
        self.is_selling = false;
        self.close_rate = None;
        self.sell_type = SellType::None;
    }

    /// Close the position from a filled sell order. Returns realized profit.
    pub fn apply_sell_fill(
        &mut self,
        fill_rate: f64,
        fill_quantity: f64,
        fill_time: DateTime<Utc>,
    ) -> f64 {
        let profit = fill_rate * fill_quantity - self.stake_amount;
        self.close_rate = Some(fill_rate);
        self.close_date = Some(fill_time);
        self.close_profit = Some(profit);
        self.close_profit_percentage = Some(profit / self.stake_amount * 100.0);
        self.is_open = false;
        self.is_selling = false;
        self.open_order_id = None;
        profit
    }

    /// Abandon an unfilled buy order and close the trade as cancelled.
    pub fn cancel_buy(&mut self, now: DateTime<Utc>) {
        self.is_buying = false;
        self.is_open = false;
        self.sell_type = SellType::Cancelled;
        self.close_date = Some(now);
        self.open_order_id = None;
    }

    /// Ratchet the trailing stop up to a new rate.
    pub fn raise_stop(&mut self, rate: f64) {
        self.stop_loss_rate = Some(rate);
    }

    /// Check the persisted-snapshot invariants. Violations are fatal at the
    /// storage boundary.
    pub fn validate(&self) -> Result<(), String> {
        if self.is_open != self.close_date.is_none() {
            return Err(format!(
                "Trade {}: is_open must mirror an unset close_date",
                self.row_key
            ));
        }
        if self.is_buying && self.is_selling {
            return Err(format!(
                "Trade {}: cannot be buying and selling at once",
                self.row_key
            ));
        }
        if self.is_buying
            && (self.buy_order_id.is_none() || self.open_order_id != self.buy_order_id)
        {
            return Err(format!(
                "Trade {}: buying requires the buy order to be the open order",
                self.row_key
            ));
        }
        if self.is_selling
            && (self.sell_order_id.is_none() || self.open_order_id != self.sell_order_id)
        {
            return Err(format!(
                "Trade {}: selling requires the sell order to be the open order",
                self.row_key
            ));
        }
        let sold = matches!(
            self.sell_type,
            SellType::StopLoss
                | SellType::TrailingStopLoss
                | SellType::Timed
                | SellType::Strategy
                | SellType::Immediate
        );
        if !self.is_open
            && sold
            && (self.close_rate.is_none()
                || self.close_profit.is_none()
                || self.close_profit_percentage.is_none())
        {
            return Err(format!(
                "Trade {}: closed {} trade is missing close economics",
                self.row_key, self.sell_type
            ));
        }
        Ok(())
    }
}
