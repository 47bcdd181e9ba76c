//! Persistence Layer
//!
//! SQLite storage for the two tables the engine owns: trades and traders.
//! The row keys implement the descending-timestamp scheme, so the default
//! ascending index scan returns the newest trades first.

pub mod models;
pub mod repository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Database connection pool.
pub type DbPool = SqlitePool;

/// Database initialization error.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

/// Initialize the database connection pool and run migrations.
///
/// # Arguments
/// - `database_url`: Path to SQLite database file (e.g. "sqlite://data/cowrie.db")
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", database_url);

    // Ensure the data directory exists
    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trades (
            partition_key TEXT NOT NULL DEFAULT 'TRADE',
            row_key TEXT PRIMARY KEY,
            trader_id TEXT NOT NULL,
            market TEXT NOT NULL,
            stake_amount REAL NOT NULL,
            open_rate REAL NOT NULL,
            close_rate REAL,
            quantity REAL NOT NULL,
            close_profit REAL,
            close_profit_percentage REAL,
            buy_order_id TEXT,
            sell_order_id TEXT,
            open_order_id TEXT,
            open_date DATETIME NOT NULL,
            close_date DATETIME,
            is_open BOOLEAN NOT NULL,
            is_buying BOOLEAN NOT NULL,
            is_selling BOOLEAN NOT NULL,
            stop_loss_rate REAL,
            strategy_used TEXT NOT NULL,
            sell_type TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create trades table: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS traders (
            partition_key TEXT NOT NULL DEFAULT 'TRADER',
            row_key TEXT PRIMARY KEY,
            current_balance REAL NOT NULL,
            stake_amount REAL NOT NULL,
            is_busy BOOLEAN NOT NULL,
            last_updated DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create traders table: {}", e)))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_is_open ON trades(is_open)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_market ON trades(market)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    Ok(())
}

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g. "sqlite://data/cowrie.db")
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/cowrie.db".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://data/cowrie.db".to_string());
        Self { url }
    }
}
