//! Trade Manager
//!
//! The cycle orchestrator. Two entry points drive the whole engine:
//!
//! - [`TradeManager::check_strategy_signals`] runs one decision cycle:
//!   cancel stale buys, check held positions for strategy sells, and open
//!   new buys into free trader slots.
//! - [`TradeManager::update_running_trades`] runs one reconciliation cycle:
//!   apply buy and sell fills reported by the venue, then evaluate the sell
//!   rules for every held position.
//!
//! Each cycle loads the working set from the store, accumulates its writes
//! in one batch per table, and flushes both at the end. The one exception is
//! the trader release in [`cancel stale buys`](TradeManager::cancel_unbought_orders),
//! which is written immediately so the free-slot scan later in the same
//! cycle observes it. The two entry points serialize behind a mutex; the
//! venue remains the source of truth for fills, so an aborted cycle is
//! repaired by the next reconciliation.

use crate::config::TradeConfig;
use crate::domain::entities::trade::{SellType, Trade};
use crate::domain::entities::trader::Trader;
use crate::domain::errors::EngineError;
use crate::domain::repositories::exchange_client::{ExchangeClient, OrderStatus};
use crate::domain::repositories::notifier::Notifier;
use crate::domain::repositories::table_store::{RowOp, TableStore, WriteBatch};
use crate::domain::services::bid_pricing::{round_dp, BidPricer, VENUE_PRECISION};
use crate::domain::services::opportunity_scanner::OpportunityScanner;
use crate::domain::services::sell_rules::{SellDecision, SellRules};
use crate::domain::services::strategies::{market_advice, TradeAdvice, TradingStrategy};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct TradeManager {
    config: TradeConfig,
    exchange: Arc<dyn ExchangeClient>,
    strategy: Arc<dyn TradingStrategy>,
    store: Arc<dyn TableStore>,
    notifier: Arc<dyn Notifier>,
    pricer: BidPricer,
    sell_rules: SellRules,
    scanner: OpportunityScanner,
    /// The two cycle entry points must never interleave.
    cycle_lock: Mutex<()>,
}

impl TradeManager {
    pub fn new(
        config: TradeConfig,
        exchange: Arc<dyn ExchangeClient>,
        strategy: Arc<dyn TradingStrategy>,
        store: Arc<dyn TableStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let pricer = BidPricer::new(
            config.buy_in_price_strategy,
            config.ask_last_balance,
            config.buy_in_price_percentage,
        );
        let sell_rules = SellRules {
            stop_loss_percentage: config.stop_loss_percentage,
            return_on_investment: config.return_on_investment.clone(),
            enable_trailing_stop: config.enable_trailing_stop,
            trailing_stop_percentage: config.trailing_stop_percentage,
            trailing_stop_starting_percentage: config.trailing_stop_starting_percentage,
        };
        let scanner = OpportunityScanner {
            quote_currency: config.quote_currency.clone(),
            minimum_volume: config.minimum_volume,
            always_trade_list: config.always_trade_list.clone(),
            market_blacklist: config.market_blacklist.clone(),
        };

        TradeManager {
            config,
            exchange,
            strategy,
            store,
            notifier,
            pricer,
            sell_rules,
            scanner,
            cycle_lock: Mutex::new(()),
        }
    }

    /// One decision cycle: cancel stale buys, sell on strategy advice, open
    /// new positions into free trader slots.
    pub async fn check_strategy_signals(&self) -> Result<(), EngineError> {
        let _cycle = self.cycle_lock.lock().await;
        debug!("Running strategy signal cycle");

        let mut traders = self.store.all_traders().await?;
        if traders.is_empty() {
            traders = self.bootstrap_traders().await?;
        }
        let mut trades = self.store.active_trades().await?;

        let mut trade_batch = WriteBatch::new();
        let mut trader_batch = WriteBatch::new();

        if self.config.cancel_unbought_each_cycle {
            self.cancel_unbought_orders(&mut trades, &mut traders, &mut trade_batch)
                .await;
            trades.retain(|trade| trade.is_open);
        }

        self.check_strategy_sells(&mut trades, &mut trade_batch).await;
        self.find_buy_opportunities(&trades, &mut traders, &mut trade_batch, &mut trader_batch)
            .await;

        self.store.execute_trade_batch(trade_batch).await?;
        self.store.execute_trader_batch(trader_batch).await?;
        Ok(())
    }

    /// One reconciliation cycle: apply buy fills, apply sell fills, then
    /// evaluate sell conditions for held positions.
    pub async fn update_running_trades(&self) -> Result<(), EngineError> {
        let _cycle = self.cycle_lock.lock().await;
        debug!("Running trade reconciliation cycle");

        let mut traders = self.store.all_traders().await?;
        let mut trades = self.store.active_trades().await?;

        let mut trade_batch = WriteBatch::new();
        let mut trader_batch = WriteBatch::new();

        self.update_open_buy_orders(&mut trades, &mut trade_batch).await;
        self.update_open_sell_orders(&mut trades, &mut traders, &mut trade_batch, &mut trader_batch)
            .await;
        self.check_for_sell_conditions(&mut trades, &mut trade_batch).await;

        self.store.execute_trade_batch(trade_batch).await?;
        self.store.execute_trader_batch(trader_batch).await?;
        Ok(())
    }

    /// First-boot creation of the trader roster.
    async fn bootstrap_traders(&self) -> Result<Vec<Trader>, EngineError> {
        let now = Utc::now();
        let roster: Vec<Trader> = (0..self.config.max_concurrent_trades)
            .map(|i| Trader::new(&format!("trader-{}", i), self.config.stake_per_trader, now))
            .collect();

        let mut batch = WriteBatch::new();
        for trader in &roster {
            batch.add(RowOp::Insert(trader.clone()));
        }
        self.store.execute_trader_batch(batch).await?;

        info!(
            "Bootstrapped {} trader slots with {} {} each",
            roster.len(),
            self.config.stake_per_trader,
            self.config.quote_currency
        );
        Ok(roster)
    }

    /// Cancel buy orders that did not fill since the last signal cycle.
    /// Partially filled buys are left to complete. Freed traders are written
    /// immediately so the free-slot scan in this cycle sees them.
    async fn cancel_unbought_orders(
        &self,
        trades: &mut [Trade],
        traders: &mut [Trader],
        trade_batch: &mut WriteBatch<Trade>,
    ) {
        for trade in trades.iter_mut().filter(|t| t.is_buying) {
            let order_id = match trade.open_order_id.clone() {
                Some(id) => id,
                None => continue,
            };

            let order = match self.exchange.get_order(&order_id, &trade.market).await {
                Ok(order) => order,
                Err(e) => {
                    warn!("Could not fetch buy order for {}: {}", trade.market, e);
                    continue;
                }
            };
            if order.status == OrderStatus::PartiallyFilled {
                debug!("Buy order on {} partially filled, leaving it", trade.market);
                continue;
            }

            if let Err(e) = self.exchange.cancel_order(&order_id, &trade.market).await {
                warn!("Could not cancel buy order for {}: {}", trade.market, e);
                continue;
            }

            let now = Utc::now();
            trade.cancel_buy(now);
            trade_batch.add(RowOp::Replace(trade.clone()));

            if let Some(trader) = traders.iter_mut().find(|t| t.row_key == trade.trader_id) {
                trader.release(now);
                if let Err(e) = self.store.save_trader(trader).await {
                    warn!("Could not release trader {}: {}", trader.row_key, e);
                }
            }

            self.notifier
                .send(&format!("cancelled {} buy order", trade.market))
                .await;
        }
    }

    /// Sell held positions the strategy has turned against.
    async fn check_strategy_sells(
        &self,
        trades: &mut [Trade],
        trade_batch: &mut WriteBatch<Trade>,
    ) {
        for trade in trades.iter_mut().filter(|t| t.awaits_sell_decision()) {
            let advice =
                market_advice(self.exchange.as_ref(), self.strategy.as_ref(), &trade.market).await;
            if advice != Some(TradeAdvice::Sell) {
                continue;
            }

            let ticker = match self.exchange.get_ticker(&trade.market).await {
                Ok(ticker) => ticker,
                Err(e) => {
                    warn!("Could not fetch ticker for {}: {}", trade.market, e);
                    continue;
                }
            };

            self.place_sell_order(trade, ticker.bid, SellType::Strategy, trade_batch)
                .await;
        }
    }

    /// Scan the market for buy candidates and assign them to free traders.
    async fn find_buy_opportunities(
        &self,
        trades: &[Trade],
        traders: &mut [Trader],
        trade_batch: &mut WriteBatch<Trade>,
        trader_batch: &mut WriteBatch<Trader>,
    ) {
        let candidates = match self
            .scanner
            .scan(self.exchange.as_ref(), self.strategy.as_ref(), trades)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Market scan failed: {}", e);
                return;
            }
        };
        if candidates.is_empty() {
            return;
        }

        let free_traders: Vec<&mut Trader> =
            traders.iter_mut().filter(|t| !t.is_busy).collect();

        for (trader, market) in free_traders.into_iter().zip(candidates) {
            match self.open_new_trade(trader, &market).await {
                Ok(trade) => {
                    trade_batch.add(RowOp::Insert(trade));
                    trader_batch.add(RowOp::Replace(trader.clone()));
                }
                Err(e @ EngineError::InsufficientFunds { .. }) => {
                    warn!("Skipping remaining buy assignments: {}", e);
                    break;
                }
                Err(e) => {
                    warn!("Could not open trade on {}: {}", market, e);
                }
            }
        }
    }

    /// Open one position: spend the trader's budget at the target bid.
    async fn open_new_trade(
        &self,
        trader: &mut Trader,
        market: &str,
    ) -> Result<Trade, EngineError> {
        let balance = self.exchange.get_balance(&self.config.quote_currency).await?;
        if balance.available < trader.current_balance {
            return Err(EngineError::InsufficientFunds {
                currency: self.config.quote_currency.clone(),
                available: balance.available,
                required: trader.current_balance,
            });
        }

        let spend = trader.current_balance.min(self.config.stake_per_trader);
        let ticker = self.exchange.get_ticker(market).await?;
        let open_rate = self.pricer.target_bid(&ticker);

        let gross_quantity = spend / open_rate;
        let net_quantity = (spend * (1.0 - self.config.fee_percentage)) / open_rate;

        let order_id = self.exchange.buy(market, gross_quantity, open_rate).await?;

        self.notifier
            .send(&format!(
                "buying {:.8} {} at {:.8} (bid {:.8}, ask {:.8}, last {:.8})",
                gross_quantity, market, open_rate, ticker.bid, ticker.ask, ticker.last
            ))
            .await;

        let now = Utc::now();
        let trade = Trade::open(
            &trader.row_key,
            market,
            spend,
            open_rate,
            net_quantity,
            &order_id,
            self.strategy.name(),
            now,
        );
        trader.occupy(now);

        Ok(trade)
    }

    /// Detect buy fills and adopt the actual fill economics. Optionally
    /// places the configured take-profit sell straight away.
    async fn update_open_buy_orders(
        &self,
        trades: &mut [Trade],
        trade_batch: &mut WriteBatch<Trade>,
    ) {
        for trade in trades.iter_mut().filter(|t| t.has_open_buy_order()) {
            let order_id = match trade.open_order_id.clone() {
                Some(id) => id,
                None => continue,
            };

            let order = match self.exchange.get_order(&order_id, &trade.market).await {
                Ok(order) => order,
                Err(e) => {
                    warn!("Could not fetch buy order for {}: {}", trade.market, e);
                    continue;
                }
            };
            if order.status != OrderStatus::Filled {
                continue;
            }

            trade.apply_buy_fill(order.original_quantity, order.price, order.time);
            trade_batch.add(RowOp::Replace(trade.clone()));

            self.notifier
                .send(&format!(
                    "bought {:.8} {} at {:.8}",
                    trade.quantity, trade.market, trade.open_rate
                ))
                .await;

            if self.config.immediately_place_sell_order {
                let sell_rate = round_dp(
                    trade.open_rate * (1.0 + self.config.immediately_place_sell_order_at_profit),
                    VENUE_PRECISION,
                );
                self.place_sell_order(trade, sell_rate, SellType::Immediate, trade_batch)
                    .await;
            }
        }
    }

    /// Detect sell fills: close the trade, book PnL and free the trader.
    async fn update_open_sell_orders(
        &self,
        trades: &mut [Trade],
        traders: &mut [Trader],
        trade_batch: &mut WriteBatch<Trade>,
        trader_batch: &mut WriteBatch<Trader>,
    ) {
        for trade in trades.iter_mut().filter(|t| t.has_open_sell_order()) {
            let order_id = match trade.open_order_id.clone() {
                Some(id) => id,
                None => continue,
            };

            let order = match self.exchange.get_order(&order_id, &trade.market).await {
                Ok(order) => order,
                Err(e) => {
                    warn!("Could not fetch sell order for {}: {}", trade.market, e);
                    continue;
                }
            };
            if order.status != OrderStatus::Filled {
                continue;
            }

            let profit = trade.apply_sell_fill(order.price, order.original_quantity, order.time);
            trade_batch.add(RowOp::Replace(trade.clone()));

            if let Some(trader) = traders.iter_mut().find(|t| t.row_key == trade.trader_id) {
                trader.credit(profit, Utc::now());
                trader_batch.add(RowOp::Replace(trader.clone()));
            } else {
                warn!("No trader found for closed trade {}", trade.row_key);
            }

            self.notifier
                .send(&format!(
                    "sold {} for {:+.8} {} ({:.2}%)",
                    trade.market,
                    profit,
                    self.config.quote_currency,
                    trade.close_profit_percentage.unwrap_or(0.0)
                ))
                .await;
        }
    }

    /// Evaluate stop-loss, ROI ladder and trailing stop for held positions.
    async fn check_for_sell_conditions(
        &self,
        trades: &mut [Trade],
        trade_batch: &mut WriteBatch<Trade>,
    ) {
        for trade in trades.iter_mut().filter(|t| t.awaits_sell_decision()) {
            let ticker = match self.exchange.get_ticker(&trade.market).await {
                Ok(ticker) => ticker,
                Err(e) => {
                    warn!("Could not fetch ticker for {}: {}", trade.market, e);
                    continue;
                }
            };

            match self.sell_rules.should_sell(trade, ticker.bid, Utc::now()) {
                SellDecision::Hold => {}
                SellDecision::RaiseStop { rate } => {
                    trade.raise_stop(rate);
                    trade_batch.add(RowOp::Replace(trade.clone()));
                    debug!("Raised trailing stop for {} to {:.8}", trade.market, rate);
                }
                SellDecision::Sell(sell_type) => {
                    self.place_sell_order(trade, ticker.bid, sell_type, trade_batch)
                        .await;
                }
            }
        }
    }

    /// Place a sell at the given rate, pre-empting an outstanding immediate
    /// sell if there is one. All trade mutations are pushed onto the batch.
    async fn place_sell_order(
        &self,
        trade: &mut Trade,
        rate: f64,
        sell_type: SellType,
        trade_batch: &mut WriteBatch<Trade>,
    ) {
        if trade.is_selling && trade.sell_type == SellType::Immediate {
            let sell_order_id = match trade.sell_order_id.clone() {
                Some(id) => id,
                None => return,
            };
            match self.exchange.cancel_order(&sell_order_id, &trade.market).await {
                Ok(()) => {
                    trade.detach_sell_order();
                    trade_batch.add(RowOp::Replace(trade.clone()));
                }
                Err(e) => {
                    warn!(
                        "Could not cancel immediate sell for {}: {}",
                        trade.market, e
                    );
                    return;
                }
            }
        }

        match self.exchange.sell(&trade.market, trade.quantity, rate).await {
            Ok(order_id) => {
                trade.attach_sell_order(&order_id, rate, sell_type);
                trade_batch.add(RowOp::Replace(trade.clone()));
                self.notifier
                    .send(&format!(
                        "selling {:.8} {} at {:.8} ({})",
                        trade.quantity, trade.market, rate, sell_type
                    ))
                    .await;
            }
            Err(e) => {
                warn!("Could not place {} sell for {}: {}", sell_type, trade.market, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::market::{Candle, CandlePeriod, CurrencyPair, MarketSummary, Ticker};
    use crate::domain::services::strategies::StrategyError;
    use crate::infrastructure::notifiers::NullNotifier;
    use crate::infrastructure::paper_client::PaperExchange;
    use crate::persistence::init_database;
    use crate::persistence::repository::SqliteTableStore;
    use std::sync::Mutex as StdMutex;

    /// Returns whatever advice the test last scripted.
    struct ScriptedStrategy {
        advice: StdMutex<TradeAdvice>,
    }

    impl ScriptedStrategy {
        fn new(advice: TradeAdvice) -> Self {
            ScriptedStrategy {
                advice: StdMutex::new(advice),
            }
        }

        fn set(&self, advice: TradeAdvice) {
            *self.advice.lock().unwrap() = advice;
        }
    }

    impl TradingStrategy for ScriptedStrategy {
        fn name(&self) -> &str {
            "scripted"
        }

        fn ideal_period(&self) -> CandlePeriod {
            CandlePeriod::OneMinute
        }

        fn minimum_amount_of_candles(&self) -> usize {
            1
        }

        fn forecast(&self, _candles: &[Candle]) -> Result<TradeAdvice, StrategyError> {
            Ok(*self.advice.lock().unwrap())
        }
    }

    async fn harness(
        config: TradeConfig,
        balance: f64,
        advice: TradeAdvice,
    ) -> (
        Arc<PaperExchange>,
        Arc<ScriptedStrategy>,
        Arc<SqliteTableStore>,
        TradeManager,
    ) {
        let exchange = Arc::new(
            PaperExchange::new()
                .with_balance(&config.quote_currency, balance)
                .await,
        );
        let strategy = Arc::new(ScriptedStrategy::new(advice));
        let pool = init_database("sqlite::memory:").await.unwrap();
        let store = Arc::new(SqliteTableStore::new(pool));
        let manager = TradeManager::new(
            config,
            exchange.clone(),
            strategy.clone(),
            store.clone(),
            Arc::new(NullNotifier),
        );
        (exchange, strategy, store, manager)
    }

    async fn seed_market(exchange: &PaperExchange, market: &str, ticker: Ticker, volume: f64) {
        let (base, quote) = market.split_once('/').unwrap();
        exchange
            .set_summaries(vec![MarketSummary {
                market_name: market.to_string(),
                base_volume: volume,
                currency_pair: CurrencyPair::new(base, quote),
            }])
            .await;
        exchange.set_ticker(market, ticker).await;
        exchange
            .set_candles(
                market,
                vec![Candle {
                    timestamp: Utc::now(),
                    open: ticker.last,
                    high: ticker.last,
                    low: ticker.last,
                    close: ticker.last,
                    volume,
                }],
            )
            .await;
    }

    fn base_config() -> TradeConfig {
        let mut config = TradeConfig::default();
        config.cancel_unbought_each_cycle = false;
        config.ask_last_balance = 0.5;
        config.stop_loss_percentage = -0.10;
        config.return_on_investment = Vec::new();
        config.enable_trailing_stop = false;
        config
    }

    const SPEC_TICKER: Ticker = Ticker {
        bid: 0.05,
        ask: 0.051,
        last: 0.052,
    };

    #[tokio::test]
    async fn test_cold_boot_creates_trader_roster() {
        let mut config = base_config();
        config.max_concurrent_trades = 3;
        config.stake_per_trader = 0.01;
        let (_exchange, _strategy, store, manager) =
            harness(config, 0.02, TradeAdvice::Hold).await;

        manager.check_strategy_signals().await.unwrap();

        let traders = store.all_traders().await.unwrap();
        assert_eq!(traders.len(), 3);
        for trader in &traders {
            assert!(!trader.is_busy);
            assert_eq!(trader.current_balance, 0.01);
        }
        assert!(store.all_trades().await.unwrap().is_empty());

        // A second cold start must not create more slots.
        manager.check_strategy_signals().await.unwrap();
        assert_eq!(store.all_traders().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_buy_on_signal_places_order_at_target_bid() {
        let (exchange, _strategy, store, manager) =
            harness(base_config(), 0.02, TradeAdvice::Buy).await;
        exchange.set_instant_fill(false);
        seed_market(&exchange, "ETH/BTC", SPEC_TICKER, 500.0).await;

        manager.check_strategy_signals().await.unwrap();

        let trades = store.active_trades().await.unwrap();
        assert_eq!(trades.len(), 1);
        let trade = &trades[0];
        assert!(trade.is_buying);
        assert!(trade.is_open);
        assert!((trade.open_rate - 0.0515).abs() < 1e-12);
        assert_eq!(trade.stake_amount, 0.01);
        // Net quantity is reduced by the fee.
        assert!((trade.quantity - (0.01 * 0.9975) / 0.0515).abs() < 1e-9);
        assert!((trade.quantity - 0.1937).abs() < 1e-4);

        // The venue order is for the gross quantity.
        let order = exchange
            .get_order(trade.buy_order_id.as_ref().unwrap(), "ETH/BTC")
            .await
            .unwrap();
        assert!((order.original_quantity - 0.01 / 0.0515).abs() < 1e-9);
        assert!((order.original_quantity - 0.1942).abs() < 1e-4);

        let traders = store.all_traders().await.unwrap();
        assert_eq!(traders.iter().filter(|t| t.is_busy).count(), 1);
    }

    #[tokio::test]
    async fn test_one_market_is_never_bought_twice() {
        let (exchange, _strategy, store, manager) =
            harness(base_config(), 0.05, TradeAdvice::Buy).await;
        exchange.set_instant_fill(false);
        seed_market(&exchange, "ETH/BTC", SPEC_TICKER, 500.0).await;

        manager.check_strategy_signals().await.unwrap();
        manager.check_strategy_signals().await.unwrap();

        assert_eq!(store.active_trades().await.unwrap().len(), 1);
        let traders = store.all_traders().await.unwrap();
        assert_eq!(traders.iter().filter(|t| t.is_busy).count(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_funds_skips_assignments() {
        let (exchange, _strategy, store, manager) =
            harness(base_config(), 0.005, TradeAdvice::Buy).await;
        exchange.set_instant_fill(false);
        seed_market(&exchange, "ETH/BTC", SPEC_TICKER, 500.0).await;

        manager.check_strategy_signals().await.unwrap();

        assert!(store.active_trades().await.unwrap().is_empty());
        let traders = store.all_traders().await.unwrap();
        assert!(traders.iter().all(|t| !t.is_busy));
    }

    #[tokio::test]
    async fn test_buy_fill_adopts_economics_and_places_immediate_sell() {
        let mut config = base_config();
        config.immediately_place_sell_order = true;
        config.immediately_place_sell_order_at_profit = 0.03;
        let (exchange, strategy, store, manager) =
            harness(config, 0.02, TradeAdvice::Buy).await;
        exchange.set_instant_fill(false);
        seed_market(&exchange, "ETH/BTC", SPEC_TICKER, 500.0).await;

        manager.check_strategy_signals().await.unwrap();
        strategy.set(TradeAdvice::Hold);

        let trades = store.active_trades().await.unwrap();
        let buy_order_id = trades[0].buy_order_id.clone().unwrap();
        exchange
            .fill_order_at(&buy_order_id, 0.0516, 0.1942, Utc::now())
            .await
            .unwrap();

        manager.update_running_trades().await.unwrap();

        let trades = store.active_trades().await.unwrap();
        assert_eq!(trades.len(), 1);
        let trade = &trades[0];
        assert_eq!(trade.open_rate, 0.0516);
        assert_eq!(trade.quantity, 0.1942);
        assert!((trade.stake_amount - 0.0516 * 0.1942).abs() < 1e-12);
        assert!(!trade.is_buying);
        assert!(trade.is_selling);
        assert_eq!(trade.sell_type, SellType::Immediate);
        assert_eq!(trade.close_rate, Some(0.05314800));

        let sell_order_id = trade.sell_order_id.clone().unwrap();
        assert_ne!(sell_order_id, buy_order_id);
        assert_eq!(trade.open_order_id.as_deref(), Some(sell_order_id.as_str()));
        let order = exchange.get_order(&sell_order_id, "ETH/BTC").await.unwrap();
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.price, 0.05314800);
    }

    #[tokio::test]
    async fn test_sell_fill_closes_trade_and_credits_trader() {
        let (exchange, strategy, store, manager) =
            harness(base_config(), 0.02, TradeAdvice::Buy).await;
        exchange.set_instant_fill(false);
        seed_market(&exchange, "ETH/BTC", SPEC_TICKER, 500.0).await;

        manager.check_strategy_signals().await.unwrap();
        let buy_order_id = store.active_trades().await.unwrap()[0]
            .buy_order_id
            .clone()
            .unwrap();
        // Fill at 0.05 for 0.2 units so the stake is exactly 0.01.
        exchange
            .fill_order_at(&buy_order_id, 0.05, 0.2, Utc::now())
            .await
            .unwrap();
        manager.update_running_trades().await.unwrap();

        // Strategy turns around; the position is sold at the bid.
        strategy.set(TradeAdvice::Sell);
        exchange
            .set_ticker(
                "ETH/BTC",
                Ticker {
                    bid: 0.055,
                    ask: 0.056,
                    last: 0.055,
                },
            )
            .await;
        manager.check_strategy_signals().await.unwrap();

        let trades = store.active_trades().await.unwrap();
        assert_eq!(trades[0].sell_type, SellType::Strategy);
        let sell_order_id = trades[0].sell_order_id.clone().unwrap();
        exchange.fill_order(&sell_order_id).await.unwrap();

        manager.update_running_trades().await.unwrap();

        assert!(store.active_trades().await.unwrap().is_empty());
        let closed = store.closed_trades(10).await.unwrap();
        assert_eq!(closed.len(), 1);
        let trade = &closed[0];
        assert_eq!(trade.close_rate, Some(0.055));
        // close_profit = 0.055 * 0.2 - 0.01
        assert!((trade.close_profit.unwrap() - 0.001).abs() < 1e-9);
        assert!((trade.close_profit_percentage.unwrap() - 10.0).abs() < 1e-6);

        let traders = store.all_traders().await.unwrap();
        let owner = traders
            .iter()
            .find(|t| t.row_key == trade.trader_id)
            .unwrap();
        assert!(!owner.is_busy);
        assert!((owner.current_balance - 0.011).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cancel_unbought_releases_trader() {
        let mut config = base_config();
        config.cancel_unbought_each_cycle = true;
        let (exchange, strategy, store, manager) =
            harness(config, 0.02, TradeAdvice::Buy).await;
        exchange.set_instant_fill(false);
        seed_market(&exchange, "ETH/BTC", SPEC_TICKER, 500.0).await;

        manager.check_strategy_signals().await.unwrap();
        let buy_order_id = store.active_trades().await.unwrap()[0]
            .buy_order_id
            .clone()
            .unwrap();

        strategy.set(TradeAdvice::Hold);
        manager.check_strategy_signals().await.unwrap();

        assert!(store.active_trades().await.unwrap().is_empty());
        let trades = store.all_trades().await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].sell_type, SellType::Cancelled);
        assert!(trades[0].close_date.is_some());
        assert!(trades[0].open_order_id.is_none());

        let order = exchange.get_order(&buy_order_id, "ETH/BTC").await.unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);

        let traders = store.all_traders().await.unwrap();
        assert!(traders.iter().all(|t| !t.is_busy));
    }

    #[tokio::test]
    async fn test_partially_filled_buy_is_never_cancelled() {
        let mut config = base_config();
        config.cancel_unbought_each_cycle = true;
        let (exchange, strategy, store, manager) =
            harness(config, 0.02, TradeAdvice::Buy).await;
        exchange.set_instant_fill(false);
        seed_market(&exchange, "ETH/BTC", SPEC_TICKER, 500.0).await;

        manager.check_strategy_signals().await.unwrap();
        let buy_order_id = store.active_trades().await.unwrap()[0]
            .buy_order_id
            .clone()
            .unwrap();
        exchange.mark_partially_filled(&buy_order_id).await.unwrap();

        strategy.set(TradeAdvice::Hold);
        manager.check_strategy_signals().await.unwrap();

        let trades = store.active_trades().await.unwrap();
        assert_eq!(trades.len(), 1);
        assert!(trades[0].is_buying);
        let order = exchange.get_order(&buy_order_id, "ETH/BTC").await.unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
    }

    #[tokio::test]
    async fn test_stop_loss_places_sell_on_reconcile() {
        let (exchange, strategy, store, manager) =
            harness(base_config(), 0.02, TradeAdvice::Buy).await;
        exchange.set_instant_fill(false);
        seed_market(&exchange, "ETH/BTC", SPEC_TICKER, 500.0).await;

        manager.check_strategy_signals().await.unwrap();
        strategy.set(TradeAdvice::Hold);
        let buy_order_id = store.active_trades().await.unwrap()[0]
            .buy_order_id
            .clone()
            .unwrap();
        exchange
            .fill_order_at(&buy_order_id, 0.05, 0.1937, Utc::now())
            .await
            .unwrap();
        manager.update_running_trades().await.unwrap();

        // profit = (0.044 - 0.05) / 0.05 = -0.12 < -0.10
        exchange
            .set_ticker(
                "ETH/BTC",
                Ticker {
                    bid: 0.044,
                    ask: 0.045,
                    last: 0.044,
                },
            )
            .await;
        manager.update_running_trades().await.unwrap();

        let trades = store.active_trades().await.unwrap();
        let trade = &trades[0];
        assert!(trade.is_selling);
        assert_eq!(trade.sell_type, SellType::StopLoss);
        assert_eq!(trade.close_rate, Some(0.044));
    }

    #[tokio::test]
    async fn test_trailing_stop_ratchets_then_triggers() {
        let mut config = base_config();
        config.enable_trailing_stop = true;
        config.trailing_stop_percentage = 0.01;
        config.trailing_stop_starting_percentage = 0.02;
        let (exchange, strategy, store, manager) =
            harness(config, 0.02, TradeAdvice::Buy).await;
        exchange.set_instant_fill(false);
        seed_market(&exchange, "ETH/BTC", SPEC_TICKER, 500.0).await;

        manager.check_strategy_signals().await.unwrap();
        strategy.set(TradeAdvice::Hold);
        let buy_order_id = store.active_trades().await.unwrap()[0]
            .buy_order_id
            .clone()
            .unwrap();
        exchange
            .fill_order_at(&buy_order_id, 0.05, 0.1937, Utc::now())
            .await
            .unwrap();
        manager.update_running_trades().await.unwrap();

        // profit = 0.08: the stop ratchets to 0.0535 but no order is placed.
        exchange
            .set_ticker(
                "ETH/BTC",
                Ticker {
                    bid: 0.054,
                    ask: 0.055,
                    last: 0.054,
                },
            )
            .await;
        manager.update_running_trades().await.unwrap();

        let trades = store.active_trades().await.unwrap();
        assert!((trades[0].stop_loss_rate.unwrap() - 0.0535).abs() < 1e-12);
        assert!(trades[0].open_order_id.is_none());
        assert!(!trades[0].is_selling);

        // Bid drops through the ratcheted stop.
        exchange
            .set_ticker(
                "ETH/BTC",
                Ticker {
                    bid: 0.053,
                    ask: 0.054,
                    last: 0.053,
                },
            )
            .await;
        manager.update_running_trades().await.unwrap();

        let trades = store.active_trades().await.unwrap();
        assert!(trades[0].is_selling);
        assert_eq!(trades[0].sell_type, SellType::TrailingStopLoss);
        assert_eq!(trades[0].close_rate, Some(0.053));
    }

    #[tokio::test]
    async fn test_strategy_sell_preempts_immediate_sell() {
        let mut config = base_config();
        config.immediately_place_sell_order = true;
        config.immediately_place_sell_order_at_profit = 0.03;
        let (exchange, strategy, store, manager) =
            harness(config, 0.02, TradeAdvice::Buy).await;
        exchange.set_instant_fill(false);
        seed_market(&exchange, "ETH/BTC", SPEC_TICKER, 500.0).await;

        manager.check_strategy_signals().await.unwrap();
        let buy_order_id = store.active_trades().await.unwrap()[0]
            .buy_order_id
            .clone()
            .unwrap();
        exchange
            .fill_order_at(&buy_order_id, 0.0516, 0.1942, Utc::now())
            .await
            .unwrap();
        manager.update_running_trades().await.unwrap();

        let immediate_id = store.active_trades().await.unwrap()[0]
            .sell_order_id
            .clone()
            .unwrap();

        strategy.set(TradeAdvice::Sell);
        manager.check_strategy_signals().await.unwrap();

        let trades = store.active_trades().await.unwrap();
        let trade = &trades[0];
        assert_eq!(trade.sell_type, SellType::Strategy);
        assert_eq!(trade.close_rate, Some(SPEC_TICKER.bid));
        let new_sell_id = trade.sell_order_id.clone().unwrap();
        assert_ne!(new_sell_id, immediate_id);

        let old_order = exchange.get_order(&immediate_id, "ETH/BTC").await.unwrap();
        assert_eq!(old_order.status, OrderStatus::Cancelled);
        let new_order = exchange.get_order(&new_sell_id, "ETH/BTC").await.unwrap();
        assert_eq!(new_order.status, OrderStatus::Open);
    }
}
