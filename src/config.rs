//! Engine configuration.
//!
//! Everything is a plain struct with sensible defaults, overridable through
//! `COWRIE_*` environment variables. The trade settings are the knobs of the
//! trade manager itself; `AppConfig` adds the wiring the binary needs
//! (database, venue credentials, cycle cadences).

use crate::domain::services::bid_pricing::BuyInPriceStrategy;
use crate::domain::services::sell_rules::RoiStep;
use crate::persistence::DatabaseConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Trade manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeConfig {
    /// Currency every stake is denominated in; only markets quoted in it
    /// are considered.
    pub quote_currency: String,
    /// Number of trader slots created at first boot.
    pub max_concurrent_trades: u32,
    /// Quote-currency budget per trader slot.
    pub stake_per_trader: f64,
    /// Minimum 24h base volume for a market to be considered.
    pub minimum_volume: f64,
    /// Base currencies traded regardless of volume.
    pub always_trade_list: Vec<String>,
    /// Base currencies never traded.
    pub market_blacklist: Vec<String>,
    /// Cancel unfilled buy orders at the start of every signal cycle.
    pub cancel_unbought_each_cycle: bool,
    /// Venue trading fee, as a fraction of the stake.
    pub fee_percentage: f64,
    pub buy_in_price_strategy: BuyInPriceStrategy,
    /// Weight between ask and last for `AskLastBalance`, in [0, 1].
    pub ask_last_balance: f64,
    /// Discount off the bid for `Percentage`.
    pub buy_in_price_percentage: f64,
    /// Place a take-profit sell as soon as a buy fills.
    pub immediately_place_sell_order: bool,
    pub immediately_place_sell_order_at_profit: f64,
    /// Negative profit ratio that triggers a stop-loss sell.
    pub stop_loss_percentage: f64,
    pub return_on_investment: Vec<RoiStep>,
    pub enable_trailing_stop: bool,
    pub trailing_stop_percentage: f64,
    pub trailing_stop_starting_percentage: f64,
    /// Trade against the in-memory paper venue instead of a live one.
    pub is_dry_running: bool,
}

impl Default for TradeConfig {
    fn default() -> Self {
        TradeConfig {
            quote_currency: "BTC".to_string(),
            max_concurrent_trades: 3,
            stake_per_trader: 0.01,
            minimum_volume: 150.0,
            always_trade_list: Vec::new(),
            market_blacklist: Vec::new(),
            cancel_unbought_each_cycle: true,
            fee_percentage: 0.0025,
            buy_in_price_strategy: BuyInPriceStrategy::AskLastBalance,
            ask_last_balance: 0.2,
            buy_in_price_percentage: 0.005,
            immediately_place_sell_order: false,
            immediately_place_sell_order_at_profit: 0.02,
            stop_loss_percentage: -0.07,
            return_on_investment: vec![
                RoiStep {
                    duration_minutes: 5,
                    profit: 0.03,
                },
                RoiStep {
                    duration_minutes: 30,
                    profit: 0.02,
                },
                RoiStep {
                    duration_minutes: 120,
                    profit: 0.01,
                },
            ],
            enable_trailing_stop: false,
            trailing_stop_percentage: 0.02,
            trailing_stop_starting_percentage: 0.05,
            is_dry_running: true,
        }
    }
}

impl TradeConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = TradeConfig::default();

        config.quote_currency = env_string("COWRIE_QUOTE_CURRENCY", config.quote_currency.clone());
        config.max_concurrent_trades =
            env_parsed("COWRIE_MAX_CONCURRENT_TRADES", config.max_concurrent_trades);
        config.stake_per_trader = env_parsed("COWRIE_STAKE_PER_TRADER", config.stake_per_trader);
        config.minimum_volume = env_parsed("COWRIE_MINIMUM_VOLUME", config.minimum_volume);
        config.always_trade_list = env_list("COWRIE_ALWAYS_TRADE", config.always_trade_list.clone());
        config.market_blacklist =
            env_list("COWRIE_MARKET_BLACKLIST", config.market_blacklist.clone());
        config.cancel_unbought_each_cycle =
            env_parsed("COWRIE_CANCEL_UNBOUGHT", config.cancel_unbought_each_cycle);
        config.fee_percentage = env_parsed("COWRIE_FEE_PERCENTAGE", config.fee_percentage);
        config.immediately_place_sell_order =
            env_parsed("COWRIE_IMMEDIATE_SELL", config.immediately_place_sell_order);
        config.immediately_place_sell_order_at_profit = env_parsed(
            "COWRIE_IMMEDIATE_SELL_PROFIT",
            config.immediately_place_sell_order_at_profit,
        );
        config.stop_loss_percentage = env_parsed("COWRIE_STOP_LOSS", config.stop_loss_percentage);
        config.enable_trailing_stop =
            env_parsed("COWRIE_TRAILING_STOP", config.enable_trailing_stop);
        config.trailing_stop_percentage = env_parsed(
            "COWRIE_TRAILING_STOP_PERCENTAGE",
            config.trailing_stop_percentage,
        );
        config.trailing_stop_starting_percentage = env_parsed(
            "COWRIE_TRAILING_STOP_START",
            config.trailing_stop_starting_percentage,
        );
        config.is_dry_running = env_parsed("COWRIE_DRY_RUN", config.is_dry_running);

        config
    }
}

/// Full application configuration for the engine binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub trade: TradeConfig,
    pub database: DatabaseConfig,
    /// Venue API credentials; unused when dry running.
    pub api_key: String,
    pub api_secret: String,
    /// Optional webhook to mirror notifications to.
    pub webhook_url: Option<String>,
    /// Cadence of the strategy-signal cycle.
    pub signal_interval: Duration,
    /// Cadence of the order-reconciliation cycle.
    pub reconcile_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        AppConfig {
            trade: TradeConfig::from_env(),
            database: DatabaseConfig::from_env(),
            api_key: env_string("COWRIE_API_KEY", String::new()),
            api_secret: env_string("COWRIE_API_SECRET", String::new()),
            webhook_url: std::env::var("COWRIE_WEBHOOK_URL").ok(),
            signal_interval: Duration::from_secs(env_parsed("COWRIE_SIGNAL_INTERVAL_SECS", 300)),
            reconcile_interval: Duration::from_secs(env_parsed(
                "COWRIE_RECONCILE_INTERVAL_SECS",
                60,
            )),
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str, default: Vec<String>) -> Vec<String> {
    match std::env::var(key) {
        Ok(value) => value
            .split(',')
            .map(|entry| entry.trim().to_string())
            .filter(|entry| !entry.is_empty())
            .collect(),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_trade_config() {
        let config = TradeConfig::default();
        assert_eq!(config.quote_currency, "BTC");
        assert_eq!(config.max_concurrent_trades, 3);
        assert_eq!(config.stake_per_trader, 0.01);
        assert!(config.stop_loss_percentage < 0.0);
        assert!(!config.return_on_investment.is_empty());
        assert!(config.is_dry_running);
    }

    #[test]
    fn test_env_list_splits_and_trims() {
        std::env::set_var("COWRIE_TEST_LIST", "XLM, DOGE ,TRX,");
        let list = env_list("COWRIE_TEST_LIST", Vec::new());
        assert_eq!(list, vec!["XLM", "DOGE", "TRX"]);
        std::env::remove_var("COWRIE_TEST_LIST");
    }
}
