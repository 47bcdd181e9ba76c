use thiserror::Error;

use crate::domain::repositories::exchange_client::ExchangeError;
use crate::domain::repositories::table_store::StoreError;

/// Errors surfaced by the trade manager's cycle entry points.
///
/// Transient venue and store failures inside a cycle are logged and the
/// per-trade action abandoned; only failures that end the whole cycle
/// propagate as `EngineError`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Insufficient funds: {available} {currency} available, {required} required")]
    InsufficientFunds {
        currency: String,
        available: f64,
        required: f64,
    },
}
