//! Durable order repository.
//!
//! Rows are keyed by `client_order_id`. Writes go through a transaction
//! that re-applies the domain transition rules, so the durable backend and
//! the in-memory backend expose identical semantics.

use crate::domain::clock::Clock;
use crate::domain::errors::CoreError;
use crate::domain::money::Money;
use crate::domain::order::{MarketType, Order, OrderSide, OrderStatus, OrderType};
use crate::domain::repositories::OrderRepository;
use crate::infrastructure::persistence::database::Database;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use std::str::FromStr;
use std::sync::Arc;

pub struct SqliteOrderRepository {
    database: Database,
    clock: Arc<dyn Clock>,
}

impl SqliteOrderRepository {
    pub fn new(database: Database, clock: Arc<dyn Clock>) -> Self {
        Self { database, clock }
    }
}

fn order_from_row(row: &SqliteRow) -> Result<Order, CoreError> {
    let money = |column: &str| -> Result<Money, CoreError> {
        let text: String = row
            .try_get(column)
            .map_err(|e| CoreError::Persistence(e.to_string()))?;
        Money::parse(&text)
    };
    let timestamp = |column: &str| -> Result<DateTime<Utc>, CoreError> {
        let secs: i64 = row
            .try_get(column)
            .map_err(|e| CoreError::Persistence(e.to_string()))?;
        DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| CoreError::Persistence(format!("bad timestamp in {column}: {secs}")))
    };
    let opt_timestamp = |column: &str| -> Result<Option<DateTime<Utc>>, CoreError> {
        let secs: Option<i64> = row
            .try_get(column)
            .map_err(|e| CoreError::Persistence(e.to_string()))?;
        Ok(secs.and_then(|s| DateTime::<Utc>::from_timestamp(s, 0)))
    };

    Ok(Order {
        client_order_id: row
            .try_get("client_order_id")
            .map_err(|e| CoreError::Persistence(e.to_string()))?,
        exchange_id: row
            .try_get("exchange_id")
            .map_err(|e| CoreError::Persistence(e.to_string()))?,
        symbol: row
            .try_get("symbol")
            .map_err(|e| CoreError::Persistence(e.to_string()))?,
        market_type: MarketType::from_str(
            row.try_get::<String, _>("market_type")
                .map_err(|e| CoreError::Persistence(e.to_string()))?
                .as_str(),
        )?,
        side: OrderSide::from_str(
            row.try_get::<String, _>("side")
                .map_err(|e| CoreError::Persistence(e.to_string()))?
                .as_str(),
        )?,
        order_type: OrderType::from_str(
            row.try_get::<String, _>("order_type")
                .map_err(|e| CoreError::Persistence(e.to_string()))?
                .as_str(),
        )?,
        price: money("price")?,
        quantity: money("quantity")?,
        filled: money("filled")?,
        status: OrderStatus::from_str(
            row.try_get::<String, _>("status")
                .map_err(|e| CoreError::Persistence(e.to_string()))?
                .as_str(),
        )?,
        created_at: timestamp("created_at")?,
        updated_at: timestamp("updated_at")?,
        submit_time: opt_timestamp("submit_time")?,
        fill_time: opt_timestamp("fill_time")?,
        leverage: row
            .try_get::<i64, _>("leverage")
            .map_err(|e| CoreError::Persistence(e.to_string()))? as u32,
        reduce_only: row
            .try_get("reduce_only")
            .map_err(|e| CoreError::Persistence(e.to_string()))?,
        protect_price: money("protect_price")?,
    })
}

async fn write_order<'e, E>(executor: E, order: &Order) -> Result<(), CoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO orders (
            client_order_id, exchange_id, symbol, market_type, side, order_type,
            price, quantity, filled, status, leverage, reduce_only, protect_price,
            created_at, updated_at, submit_time, fill_time
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        ON CONFLICT(client_order_id) DO UPDATE SET
            exchange_id = excluded.exchange_id,
            filled = excluded.filled,
            status = excluded.status,
            updated_at = excluded.updated_at,
            submit_time = excluded.submit_time,
            fill_time = excluded.fill_time
        "#,
    )
    .bind(&order.client_order_id)
    .bind(&order.exchange_id)
    .bind(&order.symbol)
    .bind(order.market_type.to_string())
    .bind(order.side.to_string())
    .bind(order.order_type.to_string())
    .bind(order.price.to_string())
    .bind(order.quantity.to_string())
    .bind(order.filled.to_string())
    .bind(order.status.to_string())
    .bind(i64::from(order.leverage))
    .bind(order.reduce_only)
    .bind(order.protect_price.to_string())
    .bind(order.created_at.timestamp())
    .bind(order.updated_at.timestamp())
    .bind(order.submit_time.map(|t| t.timestamp()))
    .bind(order.fill_time.map(|t| t.timestamp()))
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl OrderRepository for SqliteOrderRepository {
    async fn save_order(&self, order: &Order) -> Result<(), CoreError> {
        let now = self.clock.now();
        let mut tx = self.database.pool.begin().await?;

        let existing = sqlx::query("SELECT * FROM orders WHERE client_order_id = $1")
            .bind(&order.client_order_id)
            .fetch_optional(&mut *tx)
            .await?;

        let merged = match existing {
            Some(row) => {
                let mut stored = order_from_row(&row)?;
                stored.merge(order, now);
                stored
            }
            None => order.clone(),
        };

        write_order(&mut *tx, &merged).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, client_order_id: &str) -> Result<Order, CoreError> {
        let row = sqlx::query("SELECT * FROM orders WHERE client_order_id = $1")
            .bind(client_order_id)
            .fetch_optional(&self.database.pool)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {client_order_id}")))?;
        order_from_row(&row)
    }

    async fn get_order_by_exchange_id(&self, exchange_id: &str) -> Result<Order, CoreError> {
        let row = sqlx::query("SELECT * FROM orders WHERE exchange_id = $1")
            .bind(exchange_id)
            .fetch_optional(&self.database.pool)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order by exchange id {exchange_id}")))?;
        order_from_row(&row)
    }

    async fn update_order_status(
        &self,
        client_order_id: &str,
        status: OrderStatus,
    ) -> Result<(), CoreError> {
        let now = self.clock.now();
        let mut tx = self.database.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM orders WHERE client_order_id = $1")
            .bind(client_order_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {client_order_id}")))?;

        let mut order = order_from_row(&row)?;
        order.apply_status(status, now)?;

        write_order(&mut *tx, &order).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_filled(&self, client_order_id: &str, filled: Money) -> Result<(), CoreError> {
        let now = self.clock.now();
        let mut tx = self.database.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM orders WHERE client_order_id = $1")
            .bind(client_order_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {client_order_id}")))?;

        let mut order = order_from_row(&row)?;
        if filled.is_negative() || filled > order.quantity {
            return Err(CoreError::InvalidInput(format!(
                "filled {} out of range for quantity {}",
                filled, order.quantity
            )));
        }
        order.filled = filled;
        order.updated_at = now;

        write_order(&mut *tx, &order).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_active_orders(&self) -> Result<Vec<Order>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM orders WHERE status IN ('PENDING', 'SUBMITTED', 'PARTIAL_FILLED')",
        )
        .fetch_all(&self.database.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn list_orders_by_symbol(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<Order>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM orders WHERE symbol = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(symbol)
        .bind(limit as i64)
        .fetch_all(&self.database.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }
}
