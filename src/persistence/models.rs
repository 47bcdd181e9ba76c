//! Database Models
//!
//! Persistent row shapes for the trade and trader tables, plus conversions
//! to and from the domain entities. Rows carry the partition tag of their
//! table so the layout mirrors the two-partition key scheme the engine was
//! designed around.

use crate::domain::entities::trade::{SellType, Trade, TRADE_PARTITION};
use crate::domain::entities::trader::{Trader, TRADER_PARTITION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Trade row in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradeRecord {
    pub partition_key: String,
    pub row_key: String,
    pub trader_id: String,
    pub market: String,
    pub stake_amount: f64,
    pub open_rate: f64,
    pub close_rate: Option<f64>,
    pub quantity: f64,
    pub close_profit: Option<f64>,
    pub close_profit_percentage: Option<f64>,
    pub buy_order_id: Option<String>,
    pub sell_order_id: Option<String>,
    pub open_order_id: Option<String>,
    pub open_date: DateTime<Utc>,
    pub close_date: Option<DateTime<Utc>>,
    pub is_open: bool,
    pub is_buying: bool,
    pub is_selling: bool,
    pub stop_loss_rate: Option<f64>,
    pub strategy_used: String,
    pub sell_type: String,
}

impl From<&Trade> for TradeRecord {
    fn from(trade: &Trade) -> Self {
        TradeRecord {
            partition_key: TRADE_PARTITION.to_string(),
            row_key: trade.row_key.clone(),
            trader_id: trade.trader_id.clone(),
            market: trade.market.clone(),
            stake_amount: trade.stake_amount,
            open_rate: trade.open_rate,
            close_rate: trade.close_rate,
            quantity: trade.quantity,
            close_profit: trade.close_profit,
            close_profit_percentage: trade.close_profit_percentage,
            buy_order_id: trade.buy_order_id.clone(),
            sell_order_id: trade.sell_order_id.clone(),
            open_order_id: trade.open_order_id.clone(),
            open_date: trade.open_date,
            close_date: trade.close_date,
            is_open: trade.is_open,
            is_buying: trade.is_buying,
            is_selling: trade.is_selling,
            stop_loss_rate: trade.stop_loss_rate,
            strategy_used: trade.strategy_used.clone(),
            sell_type: trade.sell_type.as_str().to_string(),
        }
    }
}

impl TryFrom<TradeRecord> for Trade {
    type Error = String;

    fn try_from(record: TradeRecord) -> Result<Self, Self::Error> {
        Ok(Trade {
            row_key: record.row_key,
            trader_id: record.trader_id,
            market: record.market,
            stake_amount: record.stake_amount,
            open_rate: record.open_rate,
            close_rate: record.close_rate,
            quantity: record.quantity,
            close_profit: record.close_profit,
            close_profit_percentage: record.close_profit_percentage,
            buy_order_id: record.buy_order_id,
            sell_order_id: record.sell_order_id,
            open_order_id: record.open_order_id,
            open_date: record.open_date,
            close_date: record.close_date,
            is_open: record.is_open,
            is_buying: record.is_buying,
            is_selling: record.is_selling,
            stop_loss_rate: record.stop_loss_rate,
            strategy_used: record.strategy_used,
            sell_type: SellType::parse(&record.sell_type)?,
        })
    }
}

/// Trader row in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TraderRecord {
    pub partition_key: String,
    pub row_key: String,
    pub current_balance: f64,
    pub stake_amount: f64,
    pub is_busy: bool,
    pub last_updated: DateTime<Utc>,
}

impl From<&Trader> for TraderRecord {
    fn from(trader: &Trader) -> Self {
        TraderRecord {
            partition_key: TRADER_PARTITION.to_string(),
            row_key: trader.row_key.clone(),
            current_balance: trader.current_balance,
            stake_amount: trader.stake_amount,
            is_busy: trader.is_busy,
            last_updated: trader.last_updated,
        }
    }
}

impl From<TraderRecord> for Trader {
    fn from(record: TraderRecord) -> Self {
        Trader {
            row_key: record.row_key,
            current_balance: record.current_balance,
            stake_amount: record.stake_amount,
            is_busy: record.is_busy,
            last_updated: record.last_updated,
        }
    }
}
