//! Target-bid pricing for new buy orders.

use crate::domain::entities::market::Ticker;
use serde::{Deserialize, Serialize};

/// Decimal precision of the venue's prices.
pub const VENUE_PRECISION: u32 = 8;

/// Round to the venue's decimal precision.
pub fn round_dp(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

/// How the buy-in price is derived from the current ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuyInPriceStrategy {
    /// When the ask sits below the last trade, pay a point between the two
    /// weighted by the configured balance; otherwise take the ask.
    AskLastBalance,
    /// Bid discounted by a configured percentage.
    Percentage,
}

/// Computes the rate a buy order is placed at.
#[derive(Debug, Clone)]
pub struct BidPricer {
    strategy: BuyInPriceStrategy,
    ask_last_balance: f64,
    percentage: f64,
}

impl BidPricer {
    pub fn new(strategy: BuyInPriceStrategy, ask_last_balance: f64, percentage: f64) -> Self {
        BidPricer {
            strategy,
            ask_last_balance,
            percentage,
        }
    }

    pub fn target_bid(&self, ticker: &Ticker) -> f64 {
        match self.strategy {
            BuyInPriceStrategy::AskLastBalance => {
                if ticker.ask < ticker.last {
                    ticker.ask + self.ask_last_balance * (ticker.last - ticker.ask)
                } else {
                    ticker.ask
                }
            }
            BuyInPriceStrategy::Percentage => {
                round_dp(ticker.bid * (1.0 - self.percentage), VENUE_PRECISION)
            }
        }
    }
}
