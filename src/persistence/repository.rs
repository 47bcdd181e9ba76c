//! Table Store Implementation
//!
//! `SqliteTableStore` backs the engine's persistence port with the SQLite
//! pool. Batches run inside one transaction per table, so a cycle's writes
//! land atomically or not at all. Trade rows are checked against the domain
//! invariants before they are written; a violation aborts the batch.

use super::models::{TradeRecord, TraderRecord};
use super::DbPool;
use crate::domain::entities::trade::Trade;
use crate::domain::entities::trader::Trader;
use crate::domain::repositories::table_store::{
    RowOp, StoreError, StoreResult, TableStore, WriteBatch,
};
use async_trait::async_trait;
use sqlx::sqlite::Sqlite;
use sqlx::Transaction;
use tracing::debug;

const INSERT_TRADE: &str = r#"
    INSERT INTO trades (
        partition_key, row_key, trader_id, market, stake_amount, open_rate,
        close_rate, quantity, close_profit, close_profit_percentage,
        buy_order_id, sell_order_id, open_order_id, open_date, close_date,
        is_open, is_buying, is_selling, stop_loss_rate, strategy_used, sell_type
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
"#;

const REPLACE_TRADE: &str = r#"
    INSERT OR REPLACE INTO trades (
        partition_key, row_key, trader_id, market, stake_amount, open_rate,
        close_rate, quantity, close_profit, close_profit_percentage,
        buy_order_id, sell_order_id, open_order_id, open_date, close_date,
        is_open, is_buying, is_selling, stop_loss_rate, strategy_used, sell_type
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
"#;

const INSERT_TRADER: &str = r#"
    INSERT INTO traders (
        partition_key, row_key, current_balance, stake_amount, is_busy, last_updated
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#;

const REPLACE_TRADER: &str = r#"
    INSERT OR REPLACE INTO traders (
        partition_key, row_key, current_balance, stake_amount, is_busy, last_updated
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#;

pub struct SqliteTableStore {
    pool: DbPool,
}

impl SqliteTableStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Closed trades, newest first.
    pub async fn closed_trades(&self, limit: i64) -> StoreResult<Vec<Trade>> {
        let records = sqlx::query_as::<_, TradeRecord>(
            "SELECT * FROM trades WHERE is_open = 0 ORDER BY row_key ASC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(format!("Failed to load closed trades: {}", e)))?;

        records
            .into_iter()
            .map(|record| Trade::try_from(record).map_err(StoreError::Invariant))
            .collect()
    }

    async fn write_trade(
        tx: &mut Transaction<'_, Sqlite>,
        sql: &str,
        trade: &Trade,
    ) -> StoreResult<()> {
        trade.validate().map_err(StoreError::Invariant)?;
        let record = TradeRecord::from(trade);

        sqlx::query(sql)
            .bind(&record.partition_key)
            .bind(&record.row_key)
            .bind(&record.trader_id)
            .bind(&record.market)
            .bind(record.stake_amount)
            .bind(record.open_rate)
            .bind(record.close_rate)
            .bind(record.quantity)
            .bind(record.close_profit)
            .bind(record.close_profit_percentage)
            .bind(&record.buy_order_id)
            .bind(&record.sell_order_id)
            .bind(&record.open_order_id)
            .bind(record.open_date)
            .bind(record.close_date)
            .bind(record.is_open)
            .bind(record.is_buying)
            .bind(record.is_selling)
            .bind(record.stop_loss_rate)
            .bind(&record.strategy_used)
            .bind(&record.sell_type)
            .execute(&mut **tx)
            .await
            .map_err(|e| StoreError::Batch(format!("Failed to write trade: {}", e)))?;

        Ok(())
    }

    async fn write_trader(
        tx: &mut Transaction<'_, Sqlite>,
        sql: &str,
        trader: &Trader,
    ) -> StoreResult<()> {
        let record = TraderRecord::from(trader);

        sqlx::query(sql)
            .bind(&record.partition_key)
            .bind(&record.row_key)
            .bind(record.current_balance)
            .bind(record.stake_amount)
            .bind(record.is_busy)
            .bind(record.last_updated)
            .execute(&mut **tx)
            .await
            .map_err(|e| StoreError::Batch(format!("Failed to write trader: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl TableStore for SqliteTableStore {
    async fn active_trades(&self) -> StoreResult<Vec<Trade>> {
        let records = sqlx::query_as::<_, TradeRecord>(
            "SELECT * FROM trades WHERE is_open = 1 ORDER BY row_key ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(format!("Failed to load active trades: {}", e)))?;

        records
            .into_iter()
            .map(|record| Trade::try_from(record).map_err(StoreError::Invariant))
            .collect()
    }

    async fn all_trades(&self) -> StoreResult<Vec<Trade>> {
        let records =
            sqlx::query_as::<_, TradeRecord>("SELECT * FROM trades ORDER BY row_key ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Query(format!("Failed to load trades: {}", e)))?;

        records
            .into_iter()
            .map(|record| Trade::try_from(record).map_err(StoreError::Invariant))
            .collect()
    }

    async fn all_traders(&self) -> StoreResult<Vec<Trader>> {
        let records =
            sqlx::query_as::<_, TraderRecord>("SELECT * FROM traders ORDER BY row_key ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Query(format!("Failed to load traders: {}", e)))?;

        Ok(records.into_iter().map(Trader::from).collect())
    }

    async fn save_trader(&self, trader: &Trader) -> StoreResult<()> {
        let record = TraderRecord::from(trader);

        sqlx::query(REPLACE_TRADER)
            .bind(&record.partition_key)
            .bind(&record.row_key)
            .bind(record.current_balance)
            .bind(record.stake_amount)
            .bind(record.is_busy)
            .bind(record.last_updated)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("Failed to save trader: {}", e)))?;

        Ok(())
    }

    async fn execute_trade_batch(&self, batch: WriteBatch<Trade>) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Batch(format!("Failed to begin transaction: {}", e)))?;

        for op in batch.into_ops() {
            match op {
                RowOp::Insert(trade) => Self::write_trade(&mut tx, INSERT_TRADE, &trade).await?,
                RowOp::Replace(trade) => Self::write_trade(&mut tx, REPLACE_TRADE, &trade).await?,
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Batch(format!("Failed to commit trade batch: {}", e)))?;

        debug!("Flushed {} trade writes", count);
        Ok(())
    }

    async fn execute_trader_batch(&self, batch: WriteBatch<Trader>) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Batch(format!("Failed to begin transaction: {}", e)))?;

        for op in batch.into_ops() {
            match op {
                RowOp::Insert(trader) => Self::write_trader(&mut tx, INSERT_TRADER, &trader).await?,
                RowOp::Replace(trader) => {
                    Self::write_trader(&mut tx, REPLACE_TRADER, &trader).await?
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Batch(format!("Failed to commit trader batch: {}", e)))?;

        debug!("Flushed {} trader writes", count);
        Ok(())
    }
}
