//! Trader Entity
//!
//! A `Trader` is one capital slot: a quote-currency balance plus a busy
//! flag. Slots are created in bulk at first boot and never destroyed; a slot
//! owns at most one open trade at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Partition tag for trader rows.
pub const TRADER_PARTITION: &str = "TRADER";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trader {
    pub row_key: String,
    /// Quote currency available to this slot, grown or shrunk by realized
    /// profit and loss.
    pub current_balance: f64,
    /// Configured per-trade budget.
    pub stake_amount: f64,
    pub is_busy: bool,
    pub last_updated: DateTime<Utc>,
}

impl Trader {
    pub fn new(row_key: &str, stake_amount: f64, now: DateTime<Utc>) -> Self {
        Trader {
            row_key: row_key.to_string(),
            current_balance: stake_amount,
            stake_amount,
            is_busy: false,
            last_updated: now,
        }
    }

    /// Claim the slot for a new position.
    pub fn occupy(&mut self, now: DateTime<Utc>) {
        self.is_busy = true;
        self.last_updated = now;
    }

    /// Free the slot without touching its balance.
    pub fn release(&mut self, now: DateTime<Utc>) {
        self.is_busy = false;
        self.last_updated = now;
    }

    /// Free the slot and book realized profit or loss into its balance.
    pub fn credit(&mut self, realized_profit: f64, now: DateTime<Utc>) {
        self.current_balance += realized_profit;
        self.is_busy = false;
        self.last_updated = now;
    }
}
