//! Sell-decision engine.
//!
//! `should_sell` is a pure function of a trade snapshot, the current bid and
//! the clock. Evaluation order is part of the contract: stop loss first,
//! then the time-based ROI ladder in configured order, then the trailing
//! stop. A trailing-stop ratchet is reported as `RaiseStop` so the caller
//! persists the new rate without placing an order.

use crate::domain::entities::trade::{SellType, Trade};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One rung of the time-based return-on-investment ladder: after
/// `duration_minutes`, any profit above `profit` is taken.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoiStep {
    pub duration_minutes: i64,
    pub profit: f64,
}

/// Outcome of one sell evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SellDecision {
    /// Keep holding.
    Hold,
    /// Ratchet the trailing stop up to this rate; no order.
    RaiseStop { rate: f64 },
    /// Close the position for the given reason.
    Sell(SellType),
}

#[derive(Debug, Clone)]
pub struct SellRules {
    /// Negative threshold; profit below it triggers a stop-loss sell.
    pub stop_loss_percentage: f64,
    pub return_on_investment: Vec<RoiStep>,
    pub enable_trailing_stop: bool,
    pub trailing_stop_percentage: f64,
    pub trailing_stop_starting_percentage: f64,
}

impl SellRules {
    pub fn should_sell(&self, trade: &Trade, current_bid: f64, now: DateTime<Utc>) -> SellDecision {
        let profit = trade.profit_ratio(current_bid);

        if profit < self.stop_loss_percentage {
            return SellDecision::Sell(SellType::StopLoss);
        }

        let elapsed_minutes = (now - trade.open_date).num_milliseconds() as f64 / 60_000.0;
        for step in &self.return_on_investment {
            if elapsed_minutes > step.duration_minutes as f64 && profit > step.profit {
                return SellDecision::Sell(SellType::Timed);
            }
        }

        if self.enable_trailing_stop {
            if let Some(stop_rate) = trade.stop_loss_rate {
                if current_bid < stop_rate {
                    return SellDecision::Sell(SellType::TrailingStopLoss);
                }
            }

            let new_stop = trade.open_rate * (1.0 + (profit - self.trailing_stop_percentage));
            let improves = trade.stop_loss_rate.map_or(true, |rate| rate < new_stop);
            if profit > self.trailing_stop_starting_percentage && improves {
                return SellDecision::RaiseStop { rate: new_stop };
            }
        }

        SellDecision::Hold
    }
}
