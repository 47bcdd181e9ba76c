//! Trading strategies.
//!
//! A strategy turns a window of candles into trade advice. The trade manager
//! only sees the `TradingStrategy` trait: it asks for the candle window the
//! strategy wants (via the period and minimum-candle-count accessors) and
//! feeds the result to `forecast`. Strategy failures are never fatal to a
//! cycle; the caller treats them as "no signal" for that market.

use crate::domain::entities::market::{Candle, CandlePeriod};
use crate::domain::repositories::exchange_client::ExchangeClient;
use crate::domain::services::indicators::EMA;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeAdvice {
    Buy,
    Hold,
    Sell,
}

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Not enough candles for {strategy}: got {got}, need {need}")]
    InsufficientCandles {
        strategy: String,
        got: usize,
        need: usize,
    },
}

pub trait TradingStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Candle width this strategy is designed for.
    fn ideal_period(&self) -> CandlePeriod;

    /// Smallest candle window `forecast` accepts.
    fn minimum_amount_of_candles(&self) -> usize;

    fn forecast(&self, candles: &[Candle]) -> Result<TradeAdvice, StrategyError>;

    /// Start of the candle currently forming.
    fn current_candle_date_time(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let window = self.ideal_period().minutes() * 60;
        let secs = now.timestamp();
        let rounded = secs - secs.rem_euclid(window);
        DateTime::from_timestamp(rounded, 0).unwrap_or(now)
    }

    /// Earliest candle timestamp the strategy needs to see.
    fn minimum_date_time(&self) -> DateTime<Utc> {
        self.current_candle_date_time()
            - Duration::minutes(self.ideal_period().minutes() * self.minimum_amount_of_candles() as i64)
    }

    /// Timestamp of the newest completed candle, the one signals are
    /// computed on.
    fn signal_date(&self) -> DateTime<Utc> {
        self.current_candle_date_time() - Duration::minutes(self.ideal_period().minutes())
    }
}

/// Ask the strategy for advice on one market, swallowing failures.
///
/// History fetch errors and forecast errors are logged and collapsed to
/// `None` so a single bad market cannot starve the rest of a cycle.
pub async fn market_advice(
    exchange: &dyn ExchangeClient,
    strategy: &dyn TradingStrategy,
    market: &str,
) -> Option<TradeAdvice> {
    let candles = match exchange
        .get_ticker_history(market, strategy.minimum_date_time(), strategy.ideal_period())
        .await
    {
        Ok(candles) => candles,
        Err(e) => {
            warn!("Could not fetch candles for {}: {}", market, e);
            return None;
        }
    };

    match strategy.forecast(&candles) {
        Ok(advice) => Some(advice),
        Err(e) => {
            warn!("Strategy {} failed on {}: {}", strategy.name(), market, e);
            None
        }
    }
}

/// EMA crossover: buy when the short EMA crosses above the long EMA on the
/// latest candle, sell when it crosses below.
pub struct EmaCross {
    pub short_period: usize,
    pub long_period: usize,
}

impl EmaCross {
    pub fn new(short_period: usize, long_period: usize) -> Self {
        EmaCross {
            short_period,
            long_period,
        }
    }
}

impl Default for EmaCross {
    fn default() -> Self {
        EmaCross::new(12, 26)
    }
}

impl TradingStrategy for EmaCross {
    fn name(&self) -> &str {
        "ema_cross"
    }

    fn ideal_period(&self) -> CandlePeriod {
        CandlePeriod::ThirtyMinutes
    }

    fn minimum_amount_of_candles(&self) -> usize {
        self.long_period + 14
    }

    fn forecast(&self, candles: &[Candle]) -> Result<TradeAdvice, StrategyError> {
        let need = self.minimum_amount_of_candles();
        if candles.len() < need {
            return Err(StrategyError::InsufficientCandles {
                strategy: self.name().to_string(),
                got: candles.len(),
                need,
            });
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let short = EMA::new(self.short_period).calculate_on_values(&closes);
        let long = EMA::new(self.long_period).calculate_on_values(&closes);

        let (short_prev, short_last) = (short[short.len() - 2], short[short.len() - 1]);
        let (long_prev, long_last) = (long[long.len() - 2], long[long.len() - 1]);

        if short_prev <= long_prev && short_last > long_last {
            Ok(TradeAdvice::Buy)
        } else if short_prev >= long_prev && short_last < long_last {
            Ok(TradeAdvice::Sell)
        } else {
            Ok(TradeAdvice::Hold)
        }
    }
}
