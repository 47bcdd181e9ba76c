use cowrie::application::trade_manager::TradeManager;
use cowrie::config::AppConfig;
use cowrie::domain::repositories::exchange_client::ExchangeClient;
use cowrie::domain::repositories::notifier::Notifier;
use cowrie::domain::services::strategies::{EmaCross, TradingStrategy};
use cowrie::infrastructure::notifiers::{LogNotifier, WebhookNotifier};
use cowrie::infrastructure::paper_client::PaperExchange;
use cowrie::infrastructure::venue_client::{BittrexClient, BittrexConfig};
use cowrie::persistence::init_database;
use cowrie::persistence::repository::SqliteTableStore;
use cowrie::task_runner::{run_cycle_loop, CircuitBreakerConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cowrie=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    info!(
        "Cowrie trade engine starting ({} mode, {} slots of {} {})",
        if config.trade.is_dry_running { "dry-run" } else { "live" },
        config.trade.max_concurrent_trades,
        config.trade.stake_per_trader,
        config.trade.quote_currency
    );

    let pool = init_database(&config.database.url).await?;
    let store = Arc::new(SqliteTableStore::new(pool));

    let exchange: Arc<dyn ExchangeClient> = if config.trade.is_dry_running {
        Arc::new(
            PaperExchange::new()
                .with_balance(&config.trade.quote_currency, 1.0)
                .await,
        )
    } else {
        Arc::new(BittrexClient::new(BittrexConfig::new(
            &config.api_key,
            &config.api_secret,
        ))?)
    };

    let strategy: Arc<dyn TradingStrategy> = Arc::new(EmaCross::default());
    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url)),
        None => Arc::new(LogNotifier),
    };

    let manager = Arc::new(TradeManager::new(
        config.trade.clone(),
        exchange,
        strategy,
        store,
        notifier,
    ));

    let signal_manager = manager.clone();
    let signal_loop = tokio::spawn(async move {
        run_cycle_loop(
            "check_strategy_signals",
            config.signal_interval,
            CircuitBreakerConfig::default(),
            || {
                let manager = signal_manager.clone();
                async move {
                    manager
                        .check_strategy_signals()
                        .await
                        .map_err(|e| e.to_string())
                }
            },
        )
        .await;
    });

    let reconcile_manager = manager.clone();
    let reconcile_loop = tokio::spawn(async move {
        run_cycle_loop(
            "update_running_trades",
            config.reconcile_interval,
            CircuitBreakerConfig::default(),
            || {
                let manager = reconcile_manager.clone();
                async move {
                    manager
                        .update_running_trades()
                        .await
                        .map_err(|e| e.to_string())
                }
            },
        )
        .await;
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, stopping trade loops"),
        Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
    }

    signal_loop.abort();
    reconcile_loop.abort();
    info!("Cowrie trade engine stopped");

    Ok(())
}
