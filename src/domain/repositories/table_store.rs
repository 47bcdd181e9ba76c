//! Table Store Trait
//!
//! Persistence port for the two tables the engine owns: trades and traders.
//! Reads return full entities; writes are either an immediate single-row
//! save or a `WriteBatch` of insert/replace operations executed atomically
//! per table. The orchestrator accumulates one batch per table during a
//! cycle and flushes both at the end.

use crate::domain::entities::trade::Trade;
use crate::domain::entities::trader::Trader;
use async_trait::async_trait;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Write batch failed: {0}")]
    Batch(String),

    #[error("Invariant violation on persisted row: {0}")]
    Invariant(String),
}

/// A single batched write.
#[derive(Debug, Clone)]
pub enum RowOp<T> {
    Insert(T),
    Replace(T),
}

/// An ordered set of writes flushed atomically against one table.
#[derive(Debug, Clone)]
pub struct WriteBatch<T> {
    ops: Vec<RowOp<T>>,
}

impl<T> WriteBatch<T> {
    pub fn new() -> Self {
        WriteBatch { ops: Vec::new() }
    }

    pub fn add(&mut self, op: RowOp<T>) {
        self.ops.push(op);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn into_ops(self) -> Vec<RowOp<T>> {
        self.ops
    }
}

impl<T> Default for WriteBatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Durable storage for trades and traders.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// All trades with `is_open`, newest first.
    async fn active_trades(&self) -> StoreResult<Vec<Trade>>;

    /// Every trade row, newest first.
    async fn all_trades(&self) -> StoreResult<Vec<Trade>>;

    /// The full trader roster.
    async fn all_traders(&self) -> StoreResult<Vec<Trader>>;

    /// Immediate single-row upsert, visible to reads within the same cycle.
    async fn save_trader(&self, trader: &Trader) -> StoreResult<()>;

    /// Execute a trade batch atomically.
    async fn execute_trade_batch(&self, batch: WriteBatch<Trade>) -> StoreResult<()>;

    /// Execute a trader batch atomically.
    async fn execute_trader_batch(&self, batch: WriteBatch<Trader>) -> StoreResult<()>;
}
