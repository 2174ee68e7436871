//! In-memory repository backends for backtests and tests.
//!
//! Both repositories hold a single `RwLock` over a keyed map and return
//! deep copies on every read and write, so repo-owned memory never aliases
//! caller-visible memory.

use crate::domain::clock::Clock;
use crate::domain::errors::CoreError;
use crate::domain::money::Money;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::repositories::{OrderRepository, RiskRepository};
use crate::domain::risk::state::RiskState;
use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

fn state_key(account_id: &str, symbol: &str) -> String {
    if symbol.is_empty() {
        account_id.to_string()
    } else {
        format!("{account_id}:{symbol}")
    }
}

pub struct InMemoryRiskRepository {
    states: RwLock<HashMap<String, RiskState>>,
    /// Equity seeded into states created on first access.
    initial_equity: Money,
    clock: Arc<dyn Clock>,
}

impl InMemoryRiskRepository {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            initial_equity: Money::zero(),
            clock,
        }
    }

    /// Backtest constructor: first-touch states start at `initial_equity`
    /// instead of zero.
    pub fn with_initial_equity(clock: Arc<dyn Clock>, initial_equity: Money) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            initial_equity,
            clock,
        }
    }
}

#[async_trait]
impl RiskRepository for InMemoryRiskRepository {
    async fn load_state(&self, account_id: &str, symbol: &str) -> Result<RiskState, CoreError> {
        let states = self.states.read().await;
        if let Some(state) = states.get(&state_key(account_id, symbol)) {
            return Ok(state.clone());
        }
        let mut fresh = RiskState::new(account_id, self.initial_equity, self.clock.now());
        fresh.symbol = symbol.to_string();
        Ok(fresh)
    }

    async fn save_state(&self, state: &RiskState) -> Result<(), CoreError> {
        let mut states = self.states.write().await;
        states.insert(state_key(&state.account_id, &state.symbol), state.clone());
        Ok(())
    }

    async fn update_equity(&self, account_id: &str, new_equity: Money) -> Result<(), CoreError> {
        let now = self.clock.now();
        let mut states = self.states.write().await;
        let state = states
            .entry(state_key(account_id, ""))
            .or_insert_with(|| RiskState::new(account_id, new_equity, now));
        state.update_equity(new_equity, now);
        Ok(())
    }

    async fn record_trade(&self, account_id: &str, pnl: Money) -> Result<(), CoreError> {
        let now = self.clock.now();
        let initial_equity = self.initial_equity;
        let mut states = self.states.write().await;
        let state = states
            .entry(state_key(account_id, ""))
            .or_insert_with(|| RiskState::new(account_id, initial_equity, now));

        state.daily_pnl += pnl;
        state.daily_trade_count += 1;
        if pnl.is_negative() {
            state.record_loss(now);
        } else if pnl.is_positive() {
            state.reset_consecutive_losses(now);
        }
        state.updated_at = now;
        Ok(())
    }

    async fn open_circuit_breaker(
        &self,
        account_id: &str,
        duration_secs: i64,
    ) -> Result<(), CoreError> {
        let now = self.clock.now();
        let initial_equity = self.initial_equity;
        let mut states = self.states.write().await;
        let state = states
            .entry(state_key(account_id, ""))
            .or_insert_with(|| RiskState::new(account_id, initial_equity, now));
        state.open_circuit_breaker(Duration::seconds(duration_secs), now);
        Ok(())
    }

    async fn close_circuit_breaker(&self, account_id: &str) -> Result<(), CoreError> {
        let now = self.clock.now();
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&state_key(account_id, "")) {
            state.close_circuit_breaker(now);
        }
        Ok(())
    }

    async fn is_circuit_breaker_open(&self, account_id: &str) -> Result<bool, CoreError> {
        let now = self.clock.now();
        let mut states = self.states.write().await;
        let Some(state) = states.get_mut(&state_key(account_id, "")) else {
            return Ok(false);
        };

        if !state.circuit_breaker_open {
            return Ok(false);
        }
        if now.timestamp() >= state.circuit_breaker_until {
            // deadline passed; auto-close
            state.close_circuit_breaker(now);
            return Ok(false);
        }
        Ok(true)
    }
}

pub struct InMemoryOrderRepository {
    inner: RwLock<OrderStore>,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct OrderStore {
    orders: HashMap<String, Order>,
    by_exchange_id: HashMap<String, String>,
}

impl InMemoryOrderRepository {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(OrderStore::default()),
            clock,
        }
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save_order(&self, order: &Order) -> Result<(), CoreError> {
        let now = self.clock.now();
        let mut store = self.inner.write().await;

        match store.orders.get_mut(&order.client_order_id) {
            Some(existing) => existing.merge(order, now),
            None => {
                store
                    .orders
                    .insert(order.client_order_id.clone(), order.clone());
            }
        }

        if let Some(exchange_id) = &order.exchange_id {
            store
                .by_exchange_id
                .insert(exchange_id.clone(), order.client_order_id.clone());
        }
        Ok(())
    }

    async fn get_order(&self, client_order_id: &str) -> Result<Order, CoreError> {
        let store = self.inner.read().await;
        store
            .orders
            .get(client_order_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("order {client_order_id}")))
    }

    async fn get_order_by_exchange_id(&self, exchange_id: &str) -> Result<Order, CoreError> {
        let store = self.inner.read().await;
        let client_order_id = store
            .by_exchange_id
            .get(exchange_id)
            .ok_or_else(|| CoreError::NotFound(format!("order by exchange id {exchange_id}")))?;
        store
            .orders
            .get(client_order_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("order {client_order_id}")))
    }

    async fn update_order_status(
        &self,
        client_order_id: &str,
        status: OrderStatus,
    ) -> Result<(), CoreError> {
        let now = self.clock.now();
        let mut store = self.inner.write().await;
        let order = store
            .orders
            .get_mut(client_order_id)
            .ok_or_else(|| CoreError::NotFound(format!("order {client_order_id}")))?;
        order.apply_status(status, now)
    }

    async fn update_filled(&self, client_order_id: &str, filled: Money) -> Result<(), CoreError> {
        let now = self.clock.now();
        let mut store = self.inner.write().await;
        let order = store
            .orders
            .get_mut(client_order_id)
            .ok_or_else(|| CoreError::NotFound(format!("order {client_order_id}")))?;

        if filled.is_negative() || filled > order.quantity {
            return Err(CoreError::InvalidInput(format!(
                "filled {} out of range for quantity {}",
                filled, order.quantity
            )));
        }
        order.filled = filled;
        order.updated_at = now;
        Ok(())
    }

    async fn list_active_orders(&self) -> Result<Vec<Order>, CoreError> {
        let store = self.inner.read().await;
        Ok(store
            .orders
            .values()
            .filter(|o| o.is_active())
            .cloned()
            .collect())
    }

    async fn list_orders_by_symbol(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<Order>, CoreError> {
        let store = self.inner.read().await;
        let mut orders: Vec<Order> = store
            .orders
            .values()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders.truncate(limit);
        Ok(orders)
    }
}
