//! Per-account running risk statistics.
//!
//! A state is scoped to `(account_id, symbol)`; the empty symbol denotes
//! the account-global state. Every mutation that could change a decision
//! is persisted eagerly by the owning repository.

use crate::domain::money::Money;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub account_id: String,
    /// Empty string means account-global.
    pub symbol: String,

    pub initial_equity: Money,
    pub current_equity: Money,
    /// Monotonic non-decreasing under `update_equity`.
    pub peak_equity: Money,

    pub daily_pnl: Money,
    pub daily_trade_count: u32,
    /// Next UTC midnight; the daily reset fires once `now >= daily_reset_time`.
    pub daily_reset_time: DateTime<Utc>,
    /// YYYY-MM-DD of the last reset.
    pub last_reset_date: String,

    pub consecutive_losses: u32,
    pub last_loss_time: Option<DateTime<Utc>>,

    /// `peak_equity - current_equity`
    pub mdd: Money,
    /// `mdd / peak_equity` while the peak is positive.
    pub mdd_percent: Money,

    /// Sum of all per-symbol notionals.
    pub total_exposure: Money,
    /// symbol -> held notional value
    pub position_map: HashMap<String, Money>,

    pub circuit_breaker_open: bool,
    /// Unix seconds; zero when the breaker is closed.
    pub circuit_breaker_until: i64,

    pub updated_at: DateTime<Utc>,
}

impl RiskState {
    pub fn new(account_id: &str, initial_equity: Money, now: DateTime<Utc>) -> Self {
        Self {
            account_id: account_id.to_string(),
            symbol: String::new(),
            initial_equity,
            current_equity: initial_equity,
            peak_equity: initial_equity,
            daily_pnl: Money::zero(),
            daily_trade_count: 0,
            daily_reset_time: next_utc_midnight(now),
            last_reset_date: now.format("%Y-%m-%d").to_string(),
            consecutive_losses: 0,
            last_loss_time: None,
            mdd: Money::zero(),
            mdd_percent: Money::zero(),
            total_exposure: Money::zero(),
            position_map: HashMap::new(),
            circuit_breaker_open: false,
            circuit_breaker_until: 0,
            updated_at: now,
        }
    }

    /// Update the equity mark, raising the peak and recomputing drawdown.
    pub fn update_equity(&mut self, new_equity: Money, now: DateTime<Utc>) {
        self.current_equity = new_equity;

        if new_equity > self.peak_equity {
            self.peak_equity = new_equity;
        }

        if self.peak_equity.is_positive() {
            let drawdown = self.peak_equity - new_equity;
            self.mdd = drawdown;
            self.mdd_percent = drawdown
                .checked_div(&self.peak_equity)
                .unwrap_or_else(|_| Money::zero());
        }

        self.updated_at = now;
    }

    pub fn record_loss(&mut self, now: DateTime<Utc>) {
        self.consecutive_losses += 1;
        self.last_loss_time = Some(now);
        self.updated_at = now;
    }

    pub fn reset_consecutive_losses(&mut self, now: DateTime<Utc>) {
        self.consecutive_losses = 0;
        self.updated_at = now;
    }

    pub fn open_circuit_breaker(&mut self, duration: Duration, now: DateTime<Utc>) {
        self.circuit_breaker_open = true;
        self.circuit_breaker_until = (now + duration).timestamp();
        self.updated_at = now;
    }

    pub fn close_circuit_breaker(&mut self, now: DateTime<Utc>) {
        self.circuit_breaker_open = false;
        self.circuit_breaker_until = 0;
        self.updated_at = now;
    }

    pub fn should_reset_daily(&self, now: DateTime<Utc>) -> bool {
        now >= self.daily_reset_time
    }

    /// Clear the daily statistics and schedule the next reset.
    pub fn reset_daily(&mut self, now: DateTime<Utc>) {
        self.daily_pnl = Money::zero();
        self.daily_trade_count = 0;
        self.daily_reset_time = next_utc_midnight(now);
        self.last_reset_date = now.format("%Y-%m-%d").to_string();
        self.updated_at = now;
    }

    /// Apply a fill's notional delta to the per-symbol map and the total
    /// exposure. A negative delta shrinks the position, clamped at zero.
    pub fn record_fill(&mut self, symbol: &str, notional_delta: Money, now: DateTime<Utc>) {
        let entry = self
            .position_map
            .entry(symbol.to_string())
            .or_insert_with(Money::zero);
        let mut updated = *entry + notional_delta;
        if updated.is_negative() {
            updated = Money::zero();
        }
        *entry = updated;

        self.total_exposure = self
            .position_map
            .values()
            .fold(Money::zero(), |acc, v| acc + *v);
        self.updated_at = now;
    }
}

fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = (now + Duration::days(1)).date_naive();
    Utc.from_utc_datetime(&tomorrow.and_hms_opt(0, 0, 0).expect("valid midnight"))
}
