//! Circuit-breaker rule.
//!
//! Trips on an already-open breaker window, on the consecutive-loss streak,
//! on the daily drawdown, and on the total max drawdown. Opening a breaker
//! persists the state immediately so a crash cannot lose the halt.

use crate::application::risk::decision::DecisionDetail;
use crate::application::risk::manager::{OrderContext, RiskManager};
use crate::domain::money::Money;
use crate::domain::risk::state::RiskState;
use chrono::{DateTime, Duration, Utc};
use tracing::warn;

/// Cooldown after the loss streak trips the breaker.
const CONSECUTIVE_LOSS_COOLDOWN_SECS: i64 = 3_600;
/// Cooldown after a daily-drawdown trip; the next daily reset falls inside it.
const DAILY_DRAWDOWN_COOLDOWN_SECS: i64 = 86_400;
/// Cooldown after a total-MDD trip.
const TOTAL_MDD_COOLDOWN_SECS: i64 = 7 * 86_400;

impl RiskManager {
    pub(super) async fn check_circuit_breaker(
        &self,
        _req: &OrderContext,
        state: &mut RiskState,
    ) -> DecisionDetail {
        let now = self.clock.now();

        if state.circuit_breaker_open {
            if now.timestamp() < state.circuit_breaker_until {
                let until = DateTime::<Utc>::from_timestamp(state.circuit_breaker_until, 0)
                    .unwrap_or(now);
                return DecisionDetail::block(
                    format!("circuit breaker active until {}", until.to_rfc3339()),
                    "CircuitBreaker",
                );
            }
            // window expired; close and fall through to the threshold checks
            state.close_circuit_breaker(now);
            self.persist(state).await;
        }

        if self.config.max_consecutive_losses > 0
            && state.consecutive_losses >= self.config.max_consecutive_losses
        {
            state.open_circuit_breaker(Duration::seconds(CONSECUTIVE_LOSS_COOLDOWN_SECS), now);
            self.persist(state).await;
            self.metrics.circuit_breaker_opened_total.inc();
            warn!(
                account = %state.account_id,
                losses = state.consecutive_losses,
                "circuit breaker opened on consecutive losses"
            );
            return DecisionDetail::block(
                format!(
                    "consecutive losses ({}) >= max allowed ({})",
                    state.consecutive_losses, self.config.max_consecutive_losses
                ),
                "CircuitBreaker:ConsecutiveLosses",
            );
        }

        if self.config.max_daily_drawdown > 0.0 && state.current_equity.is_positive() {
            // Denominator is the current equity, not start-of-day equity;
            // kept for compatibility with the recorded scenarios.
            let daily_pnl_percent = state
                .daily_pnl
                .checked_div(&state.current_equity)
                .map(Money::to_f64_lossy)
                .unwrap_or(0.0);

            if daily_pnl_percent < -self.config.max_daily_drawdown {
                state.open_circuit_breaker(Duration::seconds(DAILY_DRAWDOWN_COOLDOWN_SECS), now);
                self.persist(state).await;
                self.metrics.circuit_breaker_opened_total.inc();
                warn!(
                    account = %state.account_id,
                    drawdown = daily_pnl_percent,
                    "circuit breaker opened on daily drawdown"
                );
                return DecisionDetail::block(
                    format!(
                        "daily drawdown ({:.2}%) >= max allowed ({:.2}%)",
                        daily_pnl_percent * 100.0,
                        self.config.max_daily_drawdown * 100.0
                    ),
                    "CircuitBreaker:DailyDrawdown",
                );
            }
        }

        if self.config.max_total_mdd > 0.0 {
            let total_mdd_percent = state.mdd_percent.to_f64_lossy();
            if total_mdd_percent >= self.config.max_total_mdd {
                state.open_circuit_breaker(Duration::seconds(TOTAL_MDD_COOLDOWN_SECS), now);
                self.persist(state).await;
                self.metrics.circuit_breaker_opened_total.inc();
                warn!(
                    account = %state.account_id,
                    mdd = total_mdd_percent,
                    "circuit breaker opened on total max drawdown"
                );
                return DecisionDetail::block(
                    format!(
                        "total MDD ({:.2}%) >= max allowed ({:.2}%)",
                        total_mdd_percent * 100.0,
                        self.config.max_total_mdd * 100.0
                    ),
                    "CircuitBreaker:TotalMDD",
                );
            }
        }

        DecisionDetail::allow()
    }
}

#[cfg(test)]
mod tests {
    use crate::application::risk::testutil::{manager_with, manager_with_clock, spot_context};
    use crate::domain::clock::Clock;
    use crate::domain::money::Money;
    use crate::domain::risk::config::RiskConfig;
    use crate::domain::risk::state::RiskState;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn state_with_equity(equity: &str) -> RiskState {
        RiskState::new("test", Money::parse(equity).unwrap(), Utc::now())
    }

    #[tokio::test]
    async fn consecutive_loss_thresholds() {
        // (losses, max_allowed, want_blocked)
        let cases = [
            (2_u32, 3_u32, false),
            (3, 3, true),
            (5, 3, true),
            (10, 0, false), // zero config disables the check
        ];

        for (losses, max_allowed, want_blocked) in cases {
            let mgr = manager_with(RiskConfig {
                max_consecutive_losses: max_allowed,
                ..RiskConfig::default()
            });
            let mut state = state_with_equity("10000");
            state.consecutive_losses = losses;

            let req = spot_context("BTCUSDT", dec!(50000), dec!(0.1), dec!(50000));
            let decision = mgr.check_circuit_breaker(&req, &mut state).await;

            assert_eq!(
                decision.is_blocked(),
                want_blocked,
                "losses={losses} max={max_allowed}: {decision:?}"
            );
            if want_blocked {
                assert_eq!(decision.triggered_rule, "CircuitBreaker:ConsecutiveLosses");
                assert!(state.circuit_breaker_open);
                assert_eq!(
                    state.circuit_breaker_until,
                    (mgr.clock.now() + Duration::hours(1)).timestamp()
                );
            }
        }
    }

    #[tokio::test]
    async fn daily_drawdown_thresholds() {
        // (equity, daily_pnl, max_dd, want_blocked)
        let cases = [
            ("10000", "0", 0.05, false),
            ("10000", "-100", 0.05, false),
            ("10000", "-501", 0.05, true),
            ("10000", "-1000", 0.05, true),
            ("10000", "-1000", 0.0, false), // zero config disables the check
        ];

        for (equity, daily_pnl, max_dd, want_blocked) in cases {
            let mgr = manager_with(RiskConfig {
                max_daily_drawdown: max_dd,
                ..RiskConfig::default()
            });
            let mut state = state_with_equity(equity);
            state.daily_pnl = Money::parse(daily_pnl).unwrap();

            let req = spot_context("BTCUSDT", dec!(50000), dec!(0.1), dec!(50000));
            let decision = mgr.check_circuit_breaker(&req, &mut state).await;

            assert_eq!(
                decision.is_blocked(),
                want_blocked,
                "pnl={daily_pnl} max={max_dd}: {decision:?}"
            );
            if want_blocked {
                assert_eq!(decision.triggered_rule, "CircuitBreaker:DailyDrawdown");
                assert_eq!(
                    state.circuit_breaker_until,
                    (mgr.clock.now() + Duration::hours(24)).timestamp()
                );
            }
        }
    }

    #[tokio::test]
    async fn total_mdd_trips_week_long_halt() {
        let mgr = manager_with(RiskConfig {
            max_total_mdd: 0.15,
            ..RiskConfig::default()
        });
        let mut state = state_with_equity("10000");
        state.update_equity(Money::from(dec!(8000)), Utc::now()); // 20% off peak

        let req = spot_context("BTCUSDT", dec!(50000), dec!(0.1), dec!(50000));
        let decision = mgr.check_circuit_breaker(&req, &mut state).await;

        assert!(decision.is_blocked());
        assert_eq!(decision.triggered_rule, "CircuitBreaker:TotalMDD");
        assert_eq!(
            state.circuit_breaker_until,
            (mgr.clock.now() + Duration::days(7)).timestamp()
        );
    }

    #[tokio::test]
    async fn open_breaker_blocks_until_deadline() {
        let mgr = manager_with(RiskConfig::default());
        let mut state = state_with_equity("10000");
        state.circuit_breaker_open = true;
        state.circuit_breaker_until = (mgr.clock.now() + Duration::hours(1)).timestamp();

        let req = spot_context("BTCUSDT", dec!(50000), dec!(0.1), dec!(50000));
        let decision = mgr.check_circuit_breaker(&req, &mut state).await;

        assert!(decision.is_blocked());
        assert_eq!(decision.triggered_rule, "CircuitBreaker");
        assert!(decision.reason.contains("circuit breaker active until"));
    }

    #[tokio::test]
    async fn expired_breaker_auto_closes() {
        let (mgr, clock) = manager_with_clock(RiskConfig::default());
        let mut state = state_with_equity("10000");
        state.open_circuit_breaker(Duration::hours(1), clock.now());

        clock.advance(Duration::hours(2));

        let req = spot_context("BTCUSDT", dec!(50000), dec!(0.1), dec!(50000));
        let decision = mgr.check_circuit_breaker(&req, &mut state).await;

        assert!(decision.is_allowed());
        assert!(!state.circuit_breaker_open);
        assert_eq!(state.circuit_breaker_until, 0);
    }
}
