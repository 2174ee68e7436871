//! Repository contracts, identical across the in-memory (backtest) and
//! durable (live) backends.
//!
//! Implementations must be idempotent on writes, atomic per operation and
//! deep-copy on both read and write: repo-owned memory never aliases
//! caller-visible memory.

use crate::domain::errors::CoreError;
use crate::domain::money::Money;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::risk::state::RiskState;
use async_trait::async_trait;

#[async_trait]
pub trait RiskRepository: Send + Sync {
    /// Load the state for `(account_id, symbol)`; the empty symbol is the
    /// account-global state. A missing key yields a fresh default state
    /// rather than an error.
    async fn load_state(&self, account_id: &str, symbol: &str) -> Result<RiskState, CoreError>;

    /// Idempotent full-state overwrite.
    async fn save_state(&self, state: &RiskState) -> Result<(), CoreError>;

    /// Atomic read-update-write of the equity mark, peak and drawdown.
    async fn update_equity(&self, account_id: &str, new_equity: Money) -> Result<(), CoreError>;

    /// Atomic daily-statistics update: adds `pnl` to the daily total,
    /// bumps the trade count, and advances or resets the loss streak.
    async fn record_trade(&self, account_id: &str, pnl: Money) -> Result<(), CoreError>;

    async fn open_circuit_breaker(
        &self,
        account_id: &str,
        duration_secs: i64,
    ) -> Result<(), CoreError>;

    async fn close_circuit_breaker(&self, account_id: &str) -> Result<(), CoreError>;

    /// True while a breaker window is active; a window whose deadline has
    /// passed is auto-closed and persisted.
    async fn is_circuit_breaker_open(&self, account_id: &str) -> Result<bool, CoreError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Idempotent by `client_order_id`: insert if absent, otherwise merge
    /// status/filled/timestamps/exchange id. Merging never regresses a
    /// terminal status.
    async fn save_order(&self, order: &Order) -> Result<(), CoreError>;

    async fn get_order(&self, client_order_id: &str) -> Result<Order, CoreError>;

    async fn get_order_by_exchange_id(&self, exchange_id: &str) -> Result<Order, CoreError>;

    /// Atomic status transition; refuses terminal mutation and rewinds.
    async fn update_order_status(
        &self,
        client_order_id: &str,
        status: OrderStatus,
    ) -> Result<(), CoreError>;

    async fn update_filled(&self, client_order_id: &str, filled: Money) -> Result<(), CoreError>;

    /// All orders with a non-terminal status.
    async fn list_active_orders(&self) -> Result<Vec<Order>, CoreError>;

    /// Newest-first, bounded by `limit`.
    async fn list_orders_by_symbol(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<Order>, CoreError>;
}
