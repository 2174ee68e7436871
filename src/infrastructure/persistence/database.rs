use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Shared SQLite pool wrapper; one per process.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal); // Better for concurrency

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        // 1. Orders, keyed by the client-supplied idempotency id. Statuses
        // are uppercase symbols, decimals canonical strings.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                client_order_id TEXT PRIMARY KEY,
                exchange_id TEXT,
                symbol TEXT NOT NULL,
                market_type TEXT NOT NULL DEFAULT 'SPOT',
                side TEXT NOT NULL,
                order_type TEXT NOT NULL DEFAULT 'LIMIT',
                price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                filled TEXT NOT NULL DEFAULT '0',
                status TEXT NOT NULL,
                leverage INTEGER NOT NULL DEFAULT 0,
                reduce_only BOOLEAN NOT NULL DEFAULT 0,
                protect_price TEXT NOT NULL DEFAULT '0',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                submit_time INTEGER,
                fill_time INTEGER
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create orders table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_orders_symbol_created
            ON orders (symbol, created_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create order symbol index")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_orders_status
            ON orders (status);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create order status index")?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_exchange_id
            ON orders (exchange_id) WHERE exchange_id IS NOT NULL;
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create exchange id index")?;

        // 2. Risk states, keyed by (account, symbol). The JSON blob is
        // authoritative on read; the columns exist for query support.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS risk_states (
                account_id TEXT NOT NULL,
                symbol TEXT NOT NULL DEFAULT '',
                initial_equity TEXT NOT NULL,
                current_equity TEXT NOT NULL,
                peak_equity TEXT NOT NULL,
                daily_pnl TEXT NOT NULL,
                consecutive_losses INTEGER NOT NULL DEFAULT 0,
                circuit_breaker_open BOOLEAN NOT NULL DEFAULT 0,
                circuit_breaker_until INTEGER NOT NULL DEFAULT 0,
                last_reset_date TEXT,
                state_data TEXT,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (account_id, symbol)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create risk_states table")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
