//! Fat-finger rule: rejects limit prices that stray too far from the
//! market and orders whose notional exceeds an absolute cap. Both checks
//! are disabled while their thresholds are zero.

use crate::application::risk::decision::DecisionDetail;
use crate::application::risk::manager::{OrderContext, RiskManager, order_notional};
use crate::domain::money::Money;
use crate::domain::risk::state::RiskState;

impl RiskManager {
    pub(super) fn check_fat_finger(&self, req: &OrderContext, _state: &RiskState) -> DecisionDetail {
        if self.config.max_price_deviation > 0.0
            && !req.price.is_zero()
            && req.current_price.is_positive()
        {
            let deviation = (req.price - req.current_price)
                .abs()
                .checked_div(&req.current_price)
                .map(Money::to_f64_lossy)
                .unwrap_or(0.0);

            if deviation > self.config.max_price_deviation {
                return DecisionDetail::block(
                    format!(
                        "price {} deviates {:.2}% from market {} (max {:.2}%)",
                        req.price,
                        deviation * 100.0,
                        req.current_price,
                        self.config.max_price_deviation * 100.0
                    ),
                    "FatFinger:PriceDeviation",
                );
            }
        }

        if self.config.max_order_notional > 0.0 {
            let notional = order_notional(req).to_f64_lossy();
            if notional > self.config.max_order_notional {
                return DecisionDetail::block(
                    format!(
                        "order notional {:.2} exceeds max {:.2}",
                        notional, self.config.max_order_notional
                    ),
                    "FatFinger:Notional",
                );
            }
        }

        DecisionDetail::allow()
    }
}

#[cfg(test)]
mod tests {
    use crate::application::risk::testutil::{manager_with, spot_context};
    use crate::domain::money::Money;
    use crate::domain::risk::config::RiskConfig;
    use crate::domain::risk::state::RiskState;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn state() -> RiskState {
        RiskState::new("test", Money::from(dec!(1000000)), Utc::now())
    }

    fn fat_finger_config(max_deviation: f64, max_notional: f64) -> RiskConfig {
        RiskConfig {
            max_single_position_percent: 0.0,
            max_total_exposure_percent: 0.0,
            min_cash_reserve_percent: 0.0,
            max_price_deviation: max_deviation,
            max_order_notional: max_notional,
            ..RiskConfig::default()
        }
    }

    #[test]
    fn blocks_price_far_from_market() {
        let mgr = manager_with(fat_finger_config(0.05, 0.0));
        // limit 60000 against a 50000 market is a 20% deviation
        let req = spot_context("BTCUSDT", dec!(60000), dec!(0.1), dec!(50000));

        let decision = mgr.check_fat_finger(&req, &state());
        assert!(decision.is_blocked());
        assert_eq!(decision.triggered_rule, "FatFinger:PriceDeviation");
    }

    #[test]
    fn allows_price_near_market() {
        let mgr = manager_with(fat_finger_config(0.05, 0.0));
        let req = spot_context("BTCUSDT", dec!(50500), dec!(0.1), dec!(50000));
        assert!(mgr.check_fat_finger(&req, &state()).is_allowed());
    }

    #[test]
    fn blocks_oversized_notional() {
        let mgr = manager_with(fat_finger_config(0.0, 100000.0));
        // 3 BTC * 50000 = 150000 notional
        let req = spot_context("BTCUSDT", dec!(50000), dec!(3), dec!(50000));

        let decision = mgr.check_fat_finger(&req, &state());
        assert!(decision.is_blocked());
        assert_eq!(decision.triggered_rule, "FatFinger:Notional");
    }

    #[test]
    fn disabled_thresholds_allow_everything() {
        let mgr = manager_with(fat_finger_config(0.0, 0.0));
        let req = spot_context("BTCUSDT", dec!(500000), dec!(100), dec!(50000));
        assert!(mgr.check_fat_finger(&req, &state()).is_allowed());
    }
}
