//! Position-limit rule.
//!
//! Checks, in order: single-symbol concentration (with a downsize
//! suggestion while headroom remains), total exposure, cash reserve,
//! futures leverage cap, and the large-order leverage clamp. Threshold
//! comparisons use the lossy float projection; quantity math stays exact.

use crate::application::risk::decision::DecisionDetail;
use crate::application::risk::manager::{OrderContext, RiskManager, effective_price, order_notional};
use crate::domain::money::Money;
use crate::domain::order::MarketType;
use crate::domain::risk::state::RiskState;

impl RiskManager {
    pub(super) fn check_position_limit(
        &self,
        req: &OrderContext,
        state: &RiskState,
    ) -> DecisionDetail {
        let notional = order_notional(req);

        // 1. Single-symbol concentration
        if self.config.max_single_position_percent > 0.0 && state.current_equity.is_positive() {
            let existing = state
                .position_map
                .get(&req.symbol)
                .copied()
                .unwrap_or_else(Money::zero);
            let new_position = existing + notional;
            let position_percent = new_position
                .checked_div(&state.current_equity)
                .map(Money::to_f64_lossy)
                .unwrap_or(0.0);

            if position_percent > self.config.max_single_position_percent {
                let max_allowed = state.current_equity
                    * Money::from_f64_lossy(self.config.max_single_position_percent);
                let headroom = max_allowed - existing;

                if !headroom.is_positive() {
                    return DecisionDetail::block(
                        format!(
                            "single position limit exceeded for {}: {:.2}% > {:.2}%",
                            req.symbol,
                            position_percent * 100.0,
                            self.config.max_single_position_percent * 100.0
                        ),
                        "PositionLimit:SinglePosition",
                    );
                }

                let suggested_qty = headroom
                    .checked_div(&effective_price(req))
                    .unwrap_or_else(|_| Money::zero());
                return DecisionDetail::reduce(
                    format!(
                        "single position limit: reduce to {:.2}%",
                        self.config.max_single_position_percent * 100.0
                    ),
                    "PositionLimit:SinglePosition",
                    Some(suggested_qty.to_string()),
                    Some(1),
                );
            }
        }

        // 2. Total exposure
        if self.config.max_total_exposure_percent > 0.0 && state.current_equity.is_positive() {
            let new_total = state.total_exposure + notional;
            let exposure_percent = new_total
                .checked_div(&state.current_equity)
                .map(Money::to_f64_lossy)
                .unwrap_or(0.0);

            if exposure_percent > self.config.max_total_exposure_percent {
                return DecisionDetail::block(
                    format!(
                        "total exposure limit exceeded: {:.2}% > {:.2}%",
                        exposure_percent * 100.0,
                        self.config.max_total_exposure_percent * 100.0
                    ),
                    "PositionLimit:TotalExposure",
                );
            }
        }

        // 3. Cash reserve
        if self.config.min_cash_reserve_percent > 0.0 && state.current_equity.is_positive() {
            let required_cash = state.current_equity
                * Money::from_f64_lossy(self.config.min_cash_reserve_percent);
            let available_cash = state.current_equity - state.total_exposure - notional;

            if available_cash < required_cash {
                let available_percent = available_cash
                    .checked_div(&state.current_equity)
                    .map(Money::to_f64_lossy)
                    .unwrap_or(0.0);
                return DecisionDetail::block(
                    format!(
                        "insufficient cash reserve: required {:.2}%, available {:.2}%",
                        self.config.min_cash_reserve_percent * 100.0,
                        available_percent * 100.0
                    ),
                    "PositionLimit:CashReserve",
                );
            }
        }

        if req.market_type == MarketType::Future {
            // 4. Leverage cap
            if self.config.max_leverage > 0 && req.leverage > self.config.max_leverage {
                return DecisionDetail::reduce(
                    format!(
                        "leverage {}x exceeds max {}x",
                        req.leverage, self.config.max_leverage
                    ),
                    "PositionLimit:Leverage",
                    Some(req.quantity.to_string()),
                    Some(self.config.max_leverage),
                );
            }

            // 5. Large orders are clamped to 1x
            if self.config.force_leverage_one && state.current_equity.is_positive() {
                let order_size_percent = notional
                    .checked_div(&state.current_equity)
                    .map(Money::to_f64_lossy)
                    .unwrap_or(0.0);
                if order_size_percent > self.config.large_order_threshold && req.leverage > 1 {
                    return DecisionDetail::reduce(
                        format!(
                            "large order ({:.2}% of equity) requires 1x leverage",
                            order_size_percent * 100.0
                        ),
                        "PositionLimit:LargeOrder",
                        Some(req.quantity.to_string()),
                        Some(1),
                    );
                }
            }
        }

        DecisionDetail::allow()
    }
}

#[cfg(test)]
mod tests {
    use crate::application::risk::decision::Decision;
    use crate::application::risk::testutil::{manager_with, spot_context};
    use crate::domain::money::Money;
    use crate::domain::order::MarketType;
    use crate::domain::risk::config::RiskConfig;
    use crate::domain::risk::state::RiskState;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn state_with_equity(equity: &str) -> RiskState {
        RiskState::new("test", Money::parse(equity).unwrap(), Utc::now())
    }

    fn limits_only(max_single: f64) -> RiskConfig {
        RiskConfig {
            max_single_position_percent: max_single,
            max_total_exposure_percent: 0.0,
            min_cash_reserve_percent: 0.0,
            max_leverage: 0,
            force_leverage_one: false,
            ..RiskConfig::default()
        }
    }

    #[test]
    fn single_position_thresholds() {
        // (existing_pos, order_size, want)
        let cases = [
            ("0", "0.05", Decision::Allow),
            ("0", "0.06", Decision::Allow), // exactly at the 30% limit
            ("0", "0.1", Decision::Reduce),
            ("3000", "0.01", Decision::Block), // no headroom left
        ];

        for (existing, size, want) in cases {
            let mgr = manager_with(limits_only(0.3));
            let mut state = state_with_equity("10000");
            state
                .position_map
                .insert("BTCUSDT".to_string(), Money::parse(existing).unwrap());

            let req = spot_context("BTCUSDT", dec!(50000), size.parse().unwrap(), dec!(50000));
            let decision = mgr.check_position_limit(&req, &state);

            assert_eq!(decision.decision, want, "existing={existing} size={size}: {decision:?}");
        }
    }

    #[test]
    fn single_position_reduce_suggests_headroom_quantity() {
        let mgr = manager_with(limits_only(0.3));
        let state = state_with_equity("10000");

        // 0.10 BTC * 50000 = 5000 (50% of equity); headroom is 3000 -> 0.06 BTC
        let req = spot_context("BTCUSDT", dec!(50000), dec!(0.1), dec!(50000));
        let decision = mgr.check_position_limit(&req, &state);

        assert!(decision.should_reduce());
        let suggested = Money::parse(decision.suggested_quantity.as_deref().unwrap()).unwrap();
        assert_eq!(suggested, Money::from(dec!(0.06)));
        assert_eq!(decision.suggested_leverage, Some(1));
    }

    #[test]
    fn total_exposure_blocks_on_breach() {
        let mgr = manager_with(RiskConfig {
            max_single_position_percent: 0.0,
            max_total_exposure_percent: 0.7,
            min_cash_reserve_percent: 0.0,
            ..RiskConfig::default()
        });
        let mut state = state_with_equity("10000");
        state.total_exposure = Money::from(dec!(6000)); // 60% held already

        // another 25% would take the book to 85%
        let req = spot_context("BTCUSDT", dec!(50000), dec!(0.05), dec!(50000));
        let decision = mgr.check_position_limit(&req, &state);

        assert!(decision.is_blocked());
        assert_eq!(decision.triggered_rule, "PositionLimit:TotalExposure");
    }

    #[test]
    fn cash_reserve_blocks_on_breach() {
        let mgr = manager_with(RiskConfig {
            max_single_position_percent: 0.0,
            max_total_exposure_percent: 0.0,
            min_cash_reserve_percent: 0.3,
            ..RiskConfig::default()
        });
        let mut state = state_with_equity("10000");
        state.total_exposure = Money::from(dec!(5000));

        // 5000 held + 3000 new leaves 2000 cash, under the 3000 reserve
        let req = spot_context("BTCUSDT", dec!(50000), dec!(0.06), dec!(50000));
        let decision = mgr.check_position_limit(&req, &state);

        assert!(decision.is_blocked());
        assert_eq!(decision.triggered_rule, "PositionLimit:CashReserve");
    }

    #[test]
    fn leverage_thresholds() {
        // (leverage, max_leverage, want)
        let cases = [
            (2_u32, 5_u32, Decision::Allow),
            (5, 5, Decision::Allow),
            (10, 5, Decision::Reduce),
        ];

        for (leverage, max_leverage, want) in cases {
            let mgr = manager_with(RiskConfig {
                max_single_position_percent: 0.0,
                max_total_exposure_percent: 0.0,
                min_cash_reserve_percent: 0.0,
                max_leverage,
                ..RiskConfig::default()
            });
            let state = state_with_equity("10000");

            let mut req = spot_context("BTCUSDT", dec!(50000), dec!(0.1), dec!(50000));
            req.market_type = MarketType::Future;
            req.leverage = leverage;

            let decision = mgr.check_position_limit(&req, &state);
            assert_eq!(decision.decision, want, "leverage={leverage}: {decision:?}");

            if decision.should_reduce() {
                assert_eq!(decision.suggested_leverage, Some(max_leverage));
                // quantity is untouched by the leverage cap
                let suggested =
                    Money::parse(decision.suggested_quantity.as_deref().unwrap()).unwrap();
                assert_eq!(suggested, Money::from(dec!(0.1)));
            }
        }
    }

    #[test]
    fn large_order_forces_one_x() {
        let mgr = manager_with(RiskConfig {
            max_single_position_percent: 0.0,
            max_total_exposure_percent: 0.0,
            min_cash_reserve_percent: 0.0,
            max_leverage: 0,
            force_leverage_one: true,
            large_order_threshold: 0.1,
            ..RiskConfig::default()
        });
        let state = state_with_equity("10000");

        // 0.12 BTC * 50000 = 6000 notional; at 5x the margin is 1200,
        // 12% of equity and above the 10% threshold
        let mut req = spot_context("BTCUSDT", dec!(50000), dec!(0.12), dec!(50000));
        req.market_type = MarketType::Future;
        req.leverage = 5;

        let decision = mgr.check_position_limit(&req, &state);
        assert!(decision.should_reduce());
        assert_eq!(decision.triggered_rule, "PositionLimit:LargeOrder");
        assert_eq!(decision.suggested_leverage, Some(1));
    }
}
