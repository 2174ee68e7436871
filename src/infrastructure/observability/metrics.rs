//! Prometheus metrics for the trading core.
//!
//! All metrics use the `tradegate_` prefix. The handle is created once at
//! startup, owns its registry, and is threaded through constructors; there
//! is no process-global registry.

use crate::domain::risk::state::RiskState;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // Risk checks
    pub risk_checks_total: Counter,
    pub risk_checks_allowed_total: Counter,
    /// Labeled by the triggering rule name.
    pub risk_checks_blocked_total: CounterVec,
    pub risk_checks_reduced_total: Counter,
    pub circuit_breaker_opened_total: Counter,

    // Orders
    pub orders_total: Counter,
    pub orders_filled_total: Counter,
    pub orders_rejected_total: Counter,
    pub orders_cancelled_total: Counter,

    // PnL / exposure gauges
    pub pnl_total: Gauge,
    pub pnl_daily: Gauge,
    pub pnl_percent: Gauge,
    pub total_exposure: Gauge,
    pub position_count: Gauge,
    pub max_position_size: Gauge,

    // Latency
    pub gateway_latency_seconds: Histogram,
    pub risk_check_latency_seconds: Histogram,
    pub order_latency_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let risk_checks_total = Counter::with_opts(Opts::new(
            "tradegate_risk_checks_total",
            "Total number of risk checks performed",
        ))?;
        registry.register(Box::new(risk_checks_total.clone()))?;

        let risk_checks_allowed_total = Counter::with_opts(Opts::new(
            "tradegate_risk_checks_allowed_total",
            "Total number of orders allowed by the risk manager",
        ))?;
        registry.register(Box::new(risk_checks_allowed_total.clone()))?;

        let risk_checks_blocked_total = CounterVec::new(
            Opts::new(
                "tradegate_risk_checks_blocked_total",
                "Total number of orders blocked by the risk manager, by rule",
            ),
            &["rule"],
        )?;
        registry.register(Box::new(risk_checks_blocked_total.clone()))?;

        let risk_checks_reduced_total = Counter::with_opts(Opts::new(
            "tradegate_risk_checks_reduced_total",
            "Total number of orders downsized by the risk manager",
        ))?;
        registry.register(Box::new(risk_checks_reduced_total.clone()))?;

        let circuit_breaker_opened_total = Counter::with_opts(Opts::new(
            "tradegate_circuit_breaker_opened_total",
            "Total number of times a circuit breaker was opened",
        ))?;
        registry.register(Box::new(circuit_breaker_opened_total.clone()))?;

        let orders_total = Counter::with_opts(Opts::new(
            "tradegate_orders_total",
            "Total number of orders placed",
        ))?;
        registry.register(Box::new(orders_total.clone()))?;

        let orders_filled_total = Counter::with_opts(Opts::new(
            "tradegate_orders_filled_total",
            "Total number of orders filled",
        ))?;
        registry.register(Box::new(orders_filled_total.clone()))?;

        let orders_rejected_total = Counter::with_opts(Opts::new(
            "tradegate_orders_rejected_total",
            "Total number of orders rejected",
        ))?;
        registry.register(Box::new(orders_rejected_total.clone()))?;

        let orders_cancelled_total = Counter::with_opts(Opts::new(
            "tradegate_orders_cancelled_total",
            "Total number of orders cancelled",
        ))?;
        registry.register(Box::new(orders_cancelled_total.clone()))?;

        let pnl_total = Gauge::with_opts(Opts::new(
            "tradegate_pnl_total",
            "Total profit and loss against initial equity (quote currency)",
        ))?;
        registry.register(Box::new(pnl_total.clone()))?;

        let pnl_daily = Gauge::with_opts(Opts::new(
            "tradegate_pnl_daily",
            "Profit and loss accumulated since the last daily reset",
        ))?;
        registry.register(Box::new(pnl_daily.clone()))?;

        let pnl_percent = Gauge::with_opts(Opts::new(
            "tradegate_pnl_percent",
            "Total profit and loss as a fraction of initial equity",
        ))?;
        registry.register(Box::new(pnl_percent.clone()))?;

        let total_exposure = Gauge::with_opts(Opts::new(
            "tradegate_total_exposure",
            "Sum of all open position notionals (quote currency)",
        ))?;
        registry.register(Box::new(total_exposure.clone()))?;

        let position_count = Gauge::with_opts(Opts::new(
            "tradegate_position_count",
            "Number of symbols with a non-zero position",
        ))?;
        registry.register(Box::new(position_count.clone()))?;

        let max_position_size = Gauge::with_opts(Opts::new(
            "tradegate_max_position_size",
            "Largest single position notional (quote currency)",
        ))?;
        registry.register(Box::new(max_position_size.clone()))?;

        let gateway_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "tradegate_gateway_latency_seconds",
            "Gateway operation latency in seconds",
        ))?;
        registry.register(Box::new(gateway_latency_seconds.clone()))?;

        let risk_check_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "tradegate_risk_check_latency_seconds",
                "Pre-trade risk check latency in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )?;
        registry.register(Box::new(risk_check_latency_seconds.clone()))?;

        let order_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "tradegate_order_latency_seconds",
            "End-to-end order placement latency in seconds",
        ))?;
        registry.register(Box::new(order_latency_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            risk_checks_total,
            risk_checks_allowed_total,
            risk_checks_blocked_total,
            risk_checks_reduced_total,
            circuit_breaker_opened_total,
            orders_total,
            orders_filled_total,
            orders_rejected_total,
            orders_cancelled_total,
            pnl_total,
            pnl_daily,
            pnl_percent,
            total_exposure,
            position_count,
            max_position_size,
            gateway_latency_seconds,
            risk_check_latency_seconds,
            order_latency_seconds,
        })
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn inc_blocked(&self, rule: &str) {
        self.risk_checks_blocked_total
            .with_label_values(&[rule])
            .inc();
    }

    /// Refresh the PnL/exposure gauges from a state snapshot.
    pub fn update_risk_gauges(&self, state: &RiskState) {
        let total_pnl = state.current_equity - state.initial_equity;
        self.pnl_total.set(total_pnl.to_f64_lossy());
        self.pnl_daily.set(state.daily_pnl.to_f64_lossy());
        if state.initial_equity.is_positive() {
            let pct = total_pnl
                .checked_div(&state.initial_equity)
                .map(|m| m.to_f64_lossy())
                .unwrap_or(0.0);
            self.pnl_percent.set(pct);
        }
        self.total_exposure.set(state.total_exposure.to_f64_lossy());
        let open_positions = state
            .position_map
            .values()
            .filter(|v| v.is_positive())
            .count();
        self.position_count.set(open_positions as f64);
        let largest = state
            .position_map
            .values()
            .map(|v| v.to_f64_lossy())
            .fold(0.0_f64, f64::max);
        self.max_position_size.set(largest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn metrics_creation_and_render() {
        let metrics = Metrics::new().expect("failed to create metrics");
        metrics.risk_checks_total.inc();
        metrics.inc_blocked("CircuitBreaker");
        let output = metrics.render();
        assert!(output.contains("tradegate_risk_checks_total 1"));
        assert!(output.contains("tradegate_risk_checks_blocked_total"));
        assert!(output.contains("CircuitBreaker"));
    }

    #[test]
    fn gauges_follow_state() {
        let metrics = Metrics::new().expect("failed to create metrics");
        let now = Utc::now();
        let mut state =
            crate::domain::risk::state::RiskState::new("acct", Money::from(dec!(10000)), now);
        state.update_equity(Money::from(dec!(11000)), now);
        state.record_fill("BTCUSDT", Money::from(dec!(2000)), now);
        state.record_fill("ETHUSDT", Money::from(dec!(500)), now);

        metrics.update_risk_gauges(&state);
        assert_eq!(metrics.pnl_total.get(), 1000.0);
        assert_eq!(metrics.total_exposure.get(), 2500.0);
        assert_eq!(metrics.position_count.get(), 2.0);
        assert_eq!(metrics.max_position_size.get(), 2000.0);
        assert!((metrics.pnl_percent.get() - 0.1).abs() < 1e-9);
    }
}
