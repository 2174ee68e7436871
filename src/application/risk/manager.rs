//! Pre-trade risk manager.
//!
//! `check_pre_trade` loads the account state (through a per-key snapshot
//! cache), applies the daily reset, then runs the rule chain with
//! short-circuit semantics: the first non-allow rule wins.

use crate::application::risk::decision::DecisionDetail;
use crate::domain::clock::Clock;
use crate::domain::errors::CoreError;
use crate::domain::money::Money;
use crate::domain::order::{MarketType, OrderSide, OrderType};
use crate::domain::repositories::RiskRepository;
use crate::domain::risk::config::RiskConfig;
use crate::domain::risk::state::RiskState;
use crate::infrastructure::observability::Metrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Immutable input to a risk evaluation.
#[derive(Debug, Clone)]
pub struct OrderContext {
    pub client_order_id: String,
    pub symbol: String,
    pub market_type: MarketType,
    pub side: OrderSide,
    pub order_type: OrderType,

    /// Limit price; zero for market orders.
    pub price: Money,
    pub quantity: Money,

    /// Futures-only; zero or one for spot.
    pub leverage: u32,
    pub reduce_only: bool,

    /// Worst acceptable fill price.
    pub protect_price: Money,
    /// Current market price, used for the notional of market orders.
    pub current_price: Money,
    pub account_id: String,
}

/// The rule chain. Rules share the closed signature
/// `(ctx, state) -> DecisionDetail`; new rules slot into this sequence
/// without changing the contract.
#[derive(Debug, Clone, Copy)]
enum Rule {
    CircuitBreaker,
    PositionLimit,
    FatFinger,
}

const RULE_CHAIN: [Rule; 3] = [Rule::CircuitBreaker, Rule::PositionLimit, Rule::FatFinger];

pub struct RiskManager {
    pub(super) repo: Arc<dyn RiskRepository>,
    pub(super) config: RiskConfig,
    pub(super) metrics: Metrics,
    pub(super) clock: Arc<dyn Clock>,

    /// Snapshot cache keyed by `account:symbol`, collapsing hot-path reads.
    state_cache: RwLock<HashMap<String, RiskState>>,
}

fn cache_key(account_id: &str, symbol: &str) -> String {
    if symbol.is_empty() {
        account_id.to_string()
    } else {
        format!("{account_id}:{symbol}")
    }
}

impl RiskManager {
    pub fn new(
        repo: Arc<dyn RiskRepository>,
        config: RiskConfig,
        metrics: Metrics,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self {
            repo,
            config,
            metrics,
            clock,
            state_cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Pre-trade check, the single hot-path entry point.
    pub async fn check_pre_trade(&self, req: &OrderContext) -> Result<DecisionDetail, CoreError> {
        let started = Instant::now();
        self.metrics.risk_checks_total.inc();

        let mut state = match self.load_state(&req.account_id, "").await {
            Ok(state) => state,
            Err(e) => {
                self.metrics.inc_blocked("internal");
                return Err(e);
            }
        };

        let now = self.clock.now();
        if state.should_reset_daily(now) {
            debug!(account = %req.account_id, "daily risk statistics reset");
            state.reset_daily(now);
            self.persist(&state).await;
        }

        for rule in RULE_CHAIN {
            let decision = match rule {
                Rule::CircuitBreaker => self.check_circuit_breaker(req, &mut state).await,
                Rule::PositionLimit => self.check_position_limit(req, &state),
                Rule::FatFinger => self.check_fat_finger(req, &state),
            };

            if !decision.is_allowed() {
                self.metrics
                    .risk_check_latency_seconds
                    .observe(started.elapsed().as_secs_f64());
                if decision.is_blocked() {
                    self.metrics.inc_blocked(&decision.triggered_rule);
                } else {
                    self.metrics.risk_checks_reduced_total.inc();
                }
                self.store_cache(state).await;
                return Ok(decision);
            }
        }

        self.metrics
            .risk_check_latency_seconds
            .observe(started.elapsed().as_secs_f64());
        self.metrics.risk_checks_allowed_total.inc();
        self.store_cache(state).await;
        Ok(DecisionDetail::allow())
    }

    /// Drop the cached snapshot for `(account, symbol)`. Any writer that
    /// updates the repository directly must call this before the next
    /// `check_pre_trade` would otherwise read stale data.
    pub async fn invalidate_cache(&self, account_id: &str, symbol: &str) {
        self.state_cache
            .write()
            .await
            .remove(&cache_key(account_id, symbol));
    }

    /// Post-trade settlement: push a new equity mark through the repository
    /// and refresh the cache and gauges.
    pub async fn update_equity(&self, account_id: &str, new_equity: Money) -> Result<(), CoreError> {
        self.repo.update_equity(account_id, new_equity).await?;
        self.refresh(account_id).await
    }

    /// Post-trade settlement: record a realized PnL.
    pub async fn record_trade(&self, account_id: &str, pnl: Money) -> Result<(), CoreError> {
        self.repo.record_trade(account_id, pnl).await?;
        self.refresh(account_id).await
    }

    /// Apply a fill's notional delta to the per-symbol exposure map.
    pub async fn apply_fill(
        &self,
        account_id: &str,
        symbol: &str,
        notional_delta: Money,
    ) -> Result<(), CoreError> {
        let mut state = self.repo.load_state(account_id, "").await?;
        state.record_fill(symbol, notional_delta, self.clock.now());
        self.repo.save_state(&state).await?;
        self.metrics.update_risk_gauges(&state);
        self.store_cache(state).await;
        Ok(())
    }

    pub async fn open_circuit_breaker(
        &self,
        account_id: &str,
        duration_secs: i64,
    ) -> Result<(), CoreError> {
        self.repo
            .open_circuit_breaker(account_id, duration_secs)
            .await?;
        self.metrics.circuit_breaker_opened_total.inc();
        self.refresh(account_id).await
    }

    pub async fn close_circuit_breaker(&self, account_id: &str) -> Result<(), CoreError> {
        self.repo.close_circuit_breaker(account_id).await?;
        self.refresh(account_id).await
    }

    pub async fn is_circuit_breaker_open(&self, account_id: &str) -> Result<bool, CoreError> {
        self.repo.is_circuit_breaker_open(account_id).await
    }

    async fn load_state(&self, account_id: &str, symbol: &str) -> Result<RiskState, CoreError> {
        let key = cache_key(account_id, symbol);
        if let Some(cached) = self.state_cache.read().await.get(&key) {
            return Ok(cached.clone());
        }

        let state = self.repo.load_state(account_id, symbol).await?;
        self.state_cache
            .write()
            .await
            .insert(key, state.clone());
        Ok(state)
    }

    async fn refresh(&self, account_id: &str) -> Result<(), CoreError> {
        self.invalidate_cache(account_id, "").await;
        let state = self.repo.load_state(account_id, "").await?;
        self.metrics.update_risk_gauges(&state);
        self.store_cache(state).await;
        Ok(())
    }

    pub(super) async fn store_cache(&self, state: RiskState) {
        let key = cache_key(&state.account_id, &state.symbol);
        self.state_cache.write().await.insert(key, state);
    }

    /// Best-effort mid-rule persistence; a failed write degrades to the
    /// cached state and is logged, never fails the check.
    pub(super) async fn persist(&self, state: &RiskState) {
        if let Err(e) = self.repo.save_state(state).await {
            warn!(account = %state.account_id, error = %e, "failed to persist risk state");
        }
    }
}

/// Notional value of an order: `price * quantity`, falling back to the
/// current market price for market orders; futures with leverage above 1x
/// count margin notional (`/ leverage`).
pub(super) fn order_notional(req: &OrderContext) -> Money {
    let price = if req.price.is_zero() {
        req.current_price
    } else {
        req.price
    };

    let mut notional = price * req.quantity;
    if req.market_type == MarketType::Future && req.leverage > 1 {
        notional = notional
            .checked_div(&Money::from_int(i64::from(req.leverage)))
            .unwrap_or(notional);
    }
    notional
}

/// Effective price used for quantity suggestions.
pub(super) fn effective_price(req: &OrderContext) -> Money {
    if req.price.is_zero() {
        req.current_price
    } else {
        req.price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::risk::testutil::{manager_with, manager_with_clock, spot_context};
    use crate::domain::risk::config::RiskConfig;
    use rust_decimal_macros::dec;

    #[test]
    fn notional_uses_current_price_for_market_orders() {
        let mut req = spot_context("BTCUSDT", dec!(0), dec!(0.1), dec!(48000));
        req.order_type = OrderType::Market;
        assert_eq!(order_notional(&req), Money::from(dec!(4800)));
    }

    #[test]
    fn notional_divides_margin_by_leverage() {
        let mut req = spot_context("BTCUSDT", dec!(50000), dec!(0.1), dec!(50000));
        req.market_type = MarketType::Future;
        req.leverage = 5;
        assert_eq!(order_notional(&req), Money::from(dec!(1000)));
    }

    #[tokio::test]
    async fn clean_account_is_allowed() {
        let mgr = manager_with(RiskConfig::default());
        mgr.update_equity("acct", Money::from(dec!(10000))).await.unwrap();

        let req = spot_context("BTCUSDT", dec!(50000), dec!(0.04), dec!(50000));
        let decision = mgr.check_pre_trade(&req).await.unwrap();
        assert!(decision.is_allowed(), "got {decision:?}");
    }

    #[tokio::test]
    async fn decision_is_deterministic_for_same_state() {
        let mgr = manager_with(RiskConfig::default());
        mgr.update_equity("acct", Money::from(dec!(10000))).await.unwrap();

        let req = spot_context("BTCUSDT", dec!(50000), dec!(0.1), dec!(50000));
        let first = mgr.check_pre_trade(&req).await.unwrap();
        let second = mgr.check_pre_trade(&req).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn invalidate_cache_picks_up_external_writes() {
        let mgr = manager_with(RiskConfig::default());
        mgr.update_equity("acct", Money::from(dec!(10000))).await.unwrap();

        // warm the cache
        let req = spot_context("BTCUSDT", dec!(50000), dec!(0.04), dec!(50000));
        assert!(mgr.check_pre_trade(&req).await.unwrap().is_allowed());

        // external writer trips the loss streak behind the manager's back
        for _ in 0..3 {
            mgr.repo.record_trade("acct", Money::from(dec!(-100))).await.unwrap();
        }
        mgr.invalidate_cache("acct", "").await;

        let decision = mgr.check_pre_trade(&req).await.unwrap();
        assert!(decision.is_blocked());
        assert_eq!(decision.triggered_rule, "CircuitBreaker:ConsecutiveLosses");
    }

    #[tokio::test]
    async fn earliest_rule_in_the_chain_wins() {
        let mgr = manager_with(RiskConfig::default());
        mgr.update_equity("acct", Money::from(dec!(10000))).await.unwrap();
        for _ in 0..3 {
            mgr.record_trade("acct", Money::from(dec!(-100))).await.unwrap();
        }

        // the order also breaches the single-position limit, but the
        // breaker is evaluated first
        let req = spot_context("BTCUSDT", dec!(50000), dec!(0.5), dec!(50000));
        let decision = mgr.check_pre_trade(&req).await.unwrap();
        assert!(decision.is_blocked());
        assert_eq!(decision.triggered_rule, "CircuitBreaker:ConsecutiveLosses");
    }

    #[tokio::test]
    async fn daily_reset_clears_daily_statistics() {
        let (mgr, clock) = manager_with_clock(RiskConfig::default());
        mgr.update_equity("acct", Money::from(dec!(10000))).await.unwrap();
        mgr.record_trade("acct", Money::from(dec!(-400))).await.unwrap();

        clock.advance(chrono::Duration::days(2));

        let req = spot_context("BTCUSDT", dec!(50000), dec!(0.04), dec!(50000));
        assert!(mgr.check_pre_trade(&req).await.unwrap().is_allowed());

        let state = mgr.repo.load_state("acct", "").await.unwrap();
        assert_eq!(state.daily_pnl, Money::zero());
        assert_eq!(state.daily_trade_count, 0);
    }
}
