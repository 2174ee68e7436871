use crate::domain::errors::CoreError;

/// Immutable risk-policy snapshot evaluated by the rule chain.
///
/// Percentages live in `0..=1`; a zero disables the corresponding check.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    // Circuit breaker
    pub max_consecutive_losses: u32,
    pub max_daily_drawdown: f64,
    pub max_total_mdd: f64,

    // Position limits
    pub max_single_position_percent: f64,
    pub max_total_exposure_percent: f64,
    pub min_cash_reserve_percent: f64,

    // Futures limits
    pub max_leverage: u32,
    pub force_leverage_one: bool,
    /// Order size (as fraction of equity) above which leverage is clamped to 1x.
    pub large_order_threshold: f64,

    // Fat finger
    pub max_price_deviation: f64,
    /// Absolute notional cap in quote currency; zero disables.
    pub max_order_notional: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_consecutive_losses: 3,
            max_daily_drawdown: 0.05,
            max_total_mdd: 0.15,
            max_single_position_percent: 0.30,
            max_total_exposure_percent: 0.70,
            min_cash_reserve_percent: 0.30,
            max_leverage: 2,
            force_leverage_one: false,
            large_order_threshold: 0.10,
            max_price_deviation: 0.0,
            max_order_notional: 0.0,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        let fractions = [
            ("max_daily_drawdown", self.max_daily_drawdown),
            ("max_total_mdd", self.max_total_mdd),
            ("max_single_position_percent", self.max_single_position_percent),
            ("max_total_exposure_percent", self.max_total_exposure_percent),
            ("min_cash_reserve_percent", self.min_cash_reserve_percent),
            ("large_order_threshold", self.large_order_threshold),
            ("max_price_deviation", self.max_price_deviation),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(CoreError::InvalidInput(format!(
                    "{name} out of range: {value}"
                )));
            }
        }
        if self.max_order_notional < 0.0 {
            return Err(CoreError::InvalidInput(format!(
                "max_order_notional out of range: {}",
                self.max_order_notional
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RiskConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_fraction() {
        let config = RiskConfig {
            max_daily_drawdown: 1.5,
            ..RiskConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
