//! Buy-opportunity scanner.
//!
//! Filters the venue's market listing down to candidates the strategy wants
//! to buy, ordered by descending base volume. Markets already held, markets
//! in the wrong quote currency, thin markets (unless always-traded) and
//! blacklisted bases are dropped before the strategy is consulted.

use crate::domain::entities::trade::Trade;
use crate::domain::repositories::exchange_client::{ExchangeClient, ExchangeResult};
use crate::domain::services::strategies::{market_advice, TradeAdvice, TradingStrategy};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct OpportunityScanner {
    /// Currency every market must be quoted in (uppercase).
    pub quote_currency: String,
    pub minimum_volume: f64,
    /// Base currencies traded regardless of volume.
    pub always_trade_list: Vec<String>,
    /// Base currencies never traded.
    pub market_blacklist: Vec<String>,
}

impl OpportunityScanner {
    fn in_list(list: &[String], currency: &str) -> bool {
        list.iter().any(|entry| entry.eq_ignore_ascii_case(currency))
    }

    /// Return candidate market names the strategy advises buying, ordered by
    /// descending base volume.
    pub async fn scan(
        &self,
        exchange: &dyn ExchangeClient,
        strategy: &dyn TradingStrategy,
        active_trades: &[Trade],
    ) -> ExchangeResult<Vec<String>> {
        let mut markets: Vec<_> = exchange
            .get_market_summaries()
            .await?
            .into_iter()
            .filter(|s| {
                s.currency_pair.quote.to_uppercase() == self.quote_currency.to_uppercase()
            })
            .filter(|s| {
                s.base_volume >= self.minimum_volume
                    || Self::in_list(&self.always_trade_list, &s.currency_pair.base)
            })
            .filter(|s| !active_trades.iter().any(|t| t.market == s.market_name))
            .filter(|s| !Self::in_list(&self.market_blacklist, &s.currency_pair.base))
            .collect();

        markets.sort_by(|a, b| {
            b.base_volume
                .partial_cmp(&a.base_volume)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut candidates = Vec::new();
        for summary in &markets {
            if market_advice(exchange, strategy, &summary.market_name).await
                == Some(TradeAdvice::Buy)
            {
                candidates.push(summary.market_name.clone());
            }
        }

        debug!(
            "Scanned {} markets, {} buy candidates",
            markets.len(),
            candidates.len()
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::market::{
        Candle, CandlePeriod, CurrencyPair, MarketSummary, Ticker,
    };
    use crate::domain::repositories::exchange_client::{
        Balance, ExchangeError, OrderInfo,
    };
    use crate::domain::services::strategies::StrategyError;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    struct FixedListingExchange {
        summaries: Vec<MarketSummary>,
    }

    #[async_trait]
    impl ExchangeClient for FixedListingExchange {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn get_market_summaries(&self) -> ExchangeResult<Vec<MarketSummary>> {
            Ok(self.summaries.clone())
        }

        async fn get_ticker(&self, _market: &str) -> ExchangeResult<Ticker> {
            Err(ExchangeError::MarketDataFailed("not used".to_string()))
        }

        async fn get_ticker_history(
            &self,
            _market: &str,
            _since: DateTime<Utc>,
            _period: CandlePeriod,
        ) -> ExchangeResult<Vec<Candle>> {
            Ok(vec![Candle {
                timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
            }])
        }

        async fn get_balance(&self, _currency: &str) -> ExchangeResult<Balance> {
            Err(ExchangeError::BalanceQueryFailed("not used".to_string()))
        }

        async fn buy(&self, _market: &str, _quantity: f64, _rate: f64) -> ExchangeResult<String> {
            Err(ExchangeError::OrderPlacementFailed("not used".to_string()))
        }

        async fn sell(&self, _market: &str, _quantity: f64, _rate: f64) -> ExchangeResult<String> {
            Err(ExchangeError::OrderPlacementFailed("not used".to_string()))
        }

        async fn get_order(&self, _order_id: &str, _market: &str) -> ExchangeResult<OrderInfo> {
            Err(ExchangeError::OrderStatusFailed("not used".to_string()))
        }

        async fn cancel_order(&self, _order_id: &str, _market: &str) -> ExchangeResult<()> {
            Ok(())
        }
    }

    /// Buys every market it is asked about.
    struct EagerStrategy;

    impl TradingStrategy for EagerStrategy {
        fn name(&self) -> &str {
            "eager"
        }

        fn ideal_period(&self) -> CandlePeriod {
            CandlePeriod::OneMinute
        }

        fn minimum_amount_of_candles(&self) -> usize {
            1
        }

        fn forecast(&self, candles: &[Candle]) -> Result<TradeAdvice, StrategyError> {
            let _ = candles;
            Ok(TradeAdvice::Buy)
        }
    }

    fn summary(name: &str, base: &str, quote: &str, volume: f64) -> MarketSummary {
        MarketSummary {
            market_name: name.to_string(),
            base_volume: volume,
            currency_pair: CurrencyPair::new(base, quote),
        }
    }

    fn scanner() -> OpportunityScanner {
        OpportunityScanner {
            quote_currency: "BTC".to_string(),
            minimum_volume: 100.0,
            always_trade_list: vec!["XLM".to_string()],
            market_blacklist: vec!["DOGE".to_string()],
        }
    }

    #[tokio::test]
    async fn test_scan_filters_and_sorts_by_volume() {
        let exchange = FixedListingExchange {
            summaries: vec![
                summary("ETH/BTC", "ETH", "BTC", 500.0),
                summary("LTC/BTC", "LTC", "BTC", 900.0),
                summary("ETH/USDT", "ETH", "USDT", 9000.0), // wrong quote
                summary("XRP/BTC", "XRP", "BTC", 50.0),     // thin
                summary("XLM/BTC", "XLM", "BTC", 10.0),     // thin but always traded
                summary("DOGE/BTC", "DOGE", "BTC", 800.0),  // blacklisted
            ],
        };
        let strategy = EagerStrategy;

        let candidates = scanner().scan(&exchange, &strategy, &[]).await.unwrap();
        assert_eq!(candidates, vec!["LTC/BTC", "ETH/BTC", "XLM/BTC"]);
    }

    #[tokio::test]
    async fn test_scan_skips_markets_already_held() {
        let exchange = FixedListingExchange {
            summaries: vec![
                summary("ETH/BTC", "ETH", "BTC", 500.0),
                summary("LTC/BTC", "LTC", "BTC", 900.0),
            ],
        };
        let strategy = EagerStrategy;
        let held = vec![Trade::open(
            "trader-0",
            "LTC/BTC",
            0.01,
            0.002,
            5.0,
            "buy-1",
            "eager",
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        )];

        let candidates = scanner().scan(&exchange, &strategy, &held).await.unwrap();
        assert_eq!(candidates, vec!["ETH/BTC"]);
    }

    #[tokio::test]
    async fn test_scan_quote_comparison_is_case_insensitive() {
        let exchange = FixedListingExchange {
            summaries: vec![summary("ETH/BTC", "eth", "btc", 500.0)],
        };
        let strategy = EagerStrategy;

        let candidates = scanner().scan(&exchange, &strategy, &[]).await.unwrap();
        assert_eq!(candidates, vec!["ETH/BTC"]);
    }
}
