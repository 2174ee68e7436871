//! Durable risk-state repository.
//!
//! The row carries indexed columns for query support plus a JSON blob of
//! the full state; the blob is the source of truth on read when present.

use crate::domain::clock::Clock;
use crate::domain::errors::CoreError;
use crate::domain::money::Money;
use crate::domain::repositories::RiskRepository;
use crate::domain::risk::state::RiskState;
use crate::infrastructure::persistence::database::Database;
use async_trait::async_trait;
use chrono::Duration;
use sqlx::Row;
use std::sync::Arc;

pub struct SqliteRiskRepository {
    database: Database,
    clock: Arc<dyn Clock>,
}

impl SqliteRiskRepository {
    pub fn new(database: Database, clock: Arc<dyn Clock>) -> Self {
        Self { database, clock }
    }
}

#[async_trait]
impl RiskRepository for SqliteRiskRepository {
    async fn load_state(&self, account_id: &str, symbol: &str) -> Result<RiskState, CoreError> {
        let row = sqlx::query(
            r#"
            SELECT initial_equity, current_equity, peak_equity, daily_pnl,
                   consecutive_losses, circuit_breaker_open, circuit_breaker_until,
                   last_reset_date, state_data
            FROM risk_states
            WHERE account_id = $1 AND symbol = $2
            "#,
        )
        .bind(account_id)
        .bind(symbol)
        .fetch_optional(&self.database.pool)
        .await?;

        let Some(row) = row else {
            let mut fresh = RiskState::new(account_id, Money::zero(), self.clock.now());
            fresh.symbol = symbol.to_string();
            return Ok(fresh);
        };

        // Full JSON blob wins when it parses
        let blob: Option<String> = row.try_get("state_data")?;
        if let Some(blob) = blob
            && let Ok(state) = serde_json::from_str::<RiskState>(&blob)
        {
            return Ok(state);
        }

        // Column fallback for rows written by other tools
        let mut state = RiskState::new(account_id, Money::zero(), self.clock.now());
        state.symbol = symbol.to_string();
        state.initial_equity = Money::parse(row.try_get::<String, _>("initial_equity")?.as_str())
            .unwrap_or_else(|_| Money::zero());
        state.current_equity = Money::parse(row.try_get::<String, _>("current_equity")?.as_str())
            .unwrap_or_else(|_| Money::zero());
        state.peak_equity = Money::parse(row.try_get::<String, _>("peak_equity")?.as_str())
            .unwrap_or_else(|_| Money::zero());
        state.daily_pnl = Money::parse(row.try_get::<String, _>("daily_pnl")?.as_str())
            .unwrap_or_else(|_| Money::zero());
        state.consecutive_losses = row.try_get::<i64, _>("consecutive_losses")? as u32;
        state.circuit_breaker_open = row.try_get("circuit_breaker_open")?;
        state.circuit_breaker_until = row.try_get("circuit_breaker_until")?;
        if let Some(date) = row.try_get::<Option<String>, _>("last_reset_date")? {
            state.last_reset_date = date;
        }
        Ok(state)
    }

    async fn save_state(&self, state: &RiskState) -> Result<(), CoreError> {
        let blob = serde_json::to_string(state)?;

        sqlx::query(
            r#"
            INSERT INTO risk_states (
                account_id, symbol, initial_equity, current_equity, peak_equity,
                daily_pnl, consecutive_losses, circuit_breaker_open,
                circuit_breaker_until, last_reset_date, state_data, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT(account_id, symbol) DO UPDATE SET
                initial_equity = excluded.initial_equity,
                current_equity = excluded.current_equity,
                peak_equity = excluded.peak_equity,
                daily_pnl = excluded.daily_pnl,
                consecutive_losses = excluded.consecutive_losses,
                circuit_breaker_open = excluded.circuit_breaker_open,
                circuit_breaker_until = excluded.circuit_breaker_until,
                last_reset_date = excluded.last_reset_date,
                state_data = excluded.state_data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.account_id)
        .bind(&state.symbol)
        .bind(state.initial_equity.to_string())
        .bind(state.current_equity.to_string())
        .bind(state.peak_equity.to_string())
        .bind(state.daily_pnl.to_string())
        .bind(i64::from(state.consecutive_losses))
        .bind(state.circuit_breaker_open)
        .bind(state.circuit_breaker_until)
        .bind(&state.last_reset_date)
        .bind(blob)
        .bind(state.updated_at.timestamp())
        .execute(&self.database.pool)
        .await?;

        Ok(())
    }

    async fn update_equity(&self, account_id: &str, new_equity: Money) -> Result<(), CoreError> {
        let mut state = self.load_state(account_id, "").await?;
        if state.initial_equity.is_zero() && state.peak_equity.is_zero() {
            state.initial_equity = new_equity;
            state.peak_equity = new_equity;
        }
        state.update_equity(new_equity, self.clock.now());
        self.save_state(&state).await
    }

    async fn record_trade(&self, account_id: &str, pnl: Money) -> Result<(), CoreError> {
        let now = self.clock.now();
        let mut state = self.load_state(account_id, "").await?;

        state.daily_pnl += pnl;
        state.daily_trade_count += 1;
        if pnl.is_negative() {
            state.record_loss(now);
        } else if pnl.is_positive() {
            state.reset_consecutive_losses(now);
        }
        state.updated_at = now;
        self.save_state(&state).await
    }

    async fn open_circuit_breaker(
        &self,
        account_id: &str,
        duration_secs: i64,
    ) -> Result<(), CoreError> {
        let mut state = self.load_state(account_id, "").await?;
        state.open_circuit_breaker(Duration::seconds(duration_secs), self.clock.now());
        self.save_state(&state).await
    }

    async fn close_circuit_breaker(&self, account_id: &str) -> Result<(), CoreError> {
        let mut state = self.load_state(account_id, "").await?;
        state.close_circuit_breaker(self.clock.now());
        self.save_state(&state).await
    }

    async fn is_circuit_breaker_open(&self, account_id: &str) -> Result<bool, CoreError> {
        let state = self.load_state(account_id, "").await?;
        if !state.circuit_breaker_open {
            return Ok(false);
        }
        if self.clock.now().timestamp() >= state.circuit_breaker_until {
            // deadline passed; auto-close
            self.close_circuit_breaker(account_id).await?;
            return Ok(false);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    async fn test_repo() -> (SqliteRiskRepository, Arc<ManualClock>) {
        // a pooled :memory: database is one-per-connection, so tests use a
        // throwaway file instead
        let path = std::env::temp_dir().join(format!(
            "tradegate-risk-test-{}.db",
            uuid::Uuid::new_v4().simple()
        ));
        let db = Database::new(&format!("sqlite://{}", path.display()))
            .await
            .expect("test db");
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (SqliteRiskRepository::new(db, clock.clone()), clock)
    }

    #[tokio::test]
    async fn missing_state_defaults_to_zero_equity() {
        let (repo, _) = test_repo().await;
        let state = repo.load_state("ghost", "").await.unwrap();
        assert_eq!(state.current_equity, Money::zero());
        assert_eq!(state.account_id, "ghost");
    }

    #[tokio::test]
    async fn save_load_round_trips_through_blob() {
        let (repo, clock) = test_repo().await;
        let mut state = RiskState::new("acct", Money::from(dec!(10000)), clock.now());
        state.record_fill("BTCUSDT", Money::from(dec!(2000)), clock.now());
        state.daily_pnl = Money::from(dec!(-120.5));

        repo.save_state(&state).await.unwrap();
        let loaded = repo.load_state("acct", "").await.unwrap();
        assert_eq!(loaded, state);
        // the position map only lives in the blob
        assert_eq!(loaded.position_map["BTCUSDT"], Money::from(dec!(2000)));
    }

    #[tokio::test]
    async fn save_is_idempotent() {
        let (repo, clock) = test_repo().await;
        let state = RiskState::new("acct", Money::from(dec!(10000)), clock.now());
        repo.save_state(&state).await.unwrap();
        repo.save_state(&state).await.unwrap();
        assert_eq!(repo.load_state("acct", "").await.unwrap(), state);
    }

    #[tokio::test]
    async fn update_equity_seeds_then_tracks() {
        let (repo, _) = test_repo().await;
        repo.update_equity("acct", Money::from(dec!(10000))).await.unwrap();
        repo.update_equity("acct", Money::from(dec!(9000))).await.unwrap();

        let state = repo.load_state("acct", "").await.unwrap();
        assert_eq!(state.initial_equity, Money::from(dec!(10000)));
        assert_eq!(state.peak_equity, Money::from(dec!(10000)));
        assert_eq!(state.mdd, Money::from(dec!(1000)));
        assert_eq!(state.mdd_percent, Money::from(dec!(0.1)));
    }

    #[tokio::test]
    async fn record_trade_and_breaker_lifecycle() {
        let (repo, clock) = test_repo().await;
        repo.update_equity("acct", Money::from(dec!(10000))).await.unwrap();

        for pnl in ["-100", "-150", "-200"] {
            repo.record_trade("acct", Money::parse(pnl).unwrap()).await.unwrap();
        }
        let state = repo.load_state("acct", "").await.unwrap();
        assert_eq!(state.consecutive_losses, 3);
        assert_eq!(state.daily_pnl, Money::from(dec!(-450)));

        repo.open_circuit_breaker("acct", 3600).await.unwrap();
        assert!(repo.is_circuit_breaker_open("acct").await.unwrap());

        clock.advance(Duration::hours(2));
        assert!(!repo.is_circuit_breaker_open("acct").await.unwrap());
        assert!(!repo.load_state("acct", "").await.unwrap().circuit_breaker_open);
    }
}
