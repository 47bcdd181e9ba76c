//! Market data entities returned by the exchange: summaries, tickers, and
//! the candle series strategies consume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A traded pair. `base` is the asset being bought or sold, `quote` is the
/// currency it is priced in (and the currency every stake is denominated in).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
        }
    }
}

/// One row of the venue's market summary listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSummary {
    pub market_name: String,
    pub base_volume: f64,
    pub currency_pair: CurrencyPair,
}

/// Current top-of-book quote for a market.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ticker {
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
}

/// One OHLCV candle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Candle width supported by the venue's history endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandlePeriod {
    OneMinute,
    FiveMinutes,
    ThirtyMinutes,
    Hour,
    Day,
}

impl CandlePeriod {
    pub fn minutes(&self) -> i64 {
        match self {
            CandlePeriod::OneMinute => 1,
            CandlePeriod::FiveMinutes => 5,
            CandlePeriod::ThirtyMinutes => 30,
            CandlePeriod::Hour => 60,
            CandlePeriod::Day => 1440,
        }
    }
}
