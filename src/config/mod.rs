//! Configuration loading from environment variables.
//!
//! Risk thresholds, repository backend selection and the OMS sync loop are
//! all tunable through the environment; every knob has a safe default.

use crate::domain::risk::config::RiskConfig;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which backend the risk/order repositories use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskRepoKind {
    /// Keyed map, deep-copy snapshots; deterministic backtests.
    Memory,
    /// sqlx/SQLite rows with an authoritative JSON blob.
    Durable,
}

impl FromStr for RiskRepoKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(RiskRepoKind::Memory),
            "durable" => Ok(RiskRepoKind::Durable),
            _ => anyhow::bail!("Invalid RISK_REPO_TYPE: {}. Must be 'memory' or 'durable'", s),
        }
    }
}

/// Core service configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub risk: RiskConfig,

    pub risk_repo_type: RiskRepoKind,
    pub database_url: String,

    /// Active-order reconciliation interval.
    pub sync_interval: Duration,
    pub auto_sync: bool,
}

impl CoreConfig {
    /// Load from the environment, reading a `.env` file when present.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        let risk = RiskConfig {
            max_consecutive_losses: parse_u32("MAX_CONSECUTIVE_LOSSES", 3)?,
            max_daily_drawdown: parse_f64("MAX_DAILY_DRAWDOWN", 0.05)?,
            max_total_mdd: parse_f64("MAX_TOTAL_MDD", 0.15)?,
            max_single_position_percent: parse_f64("MAX_SINGLE_POSITION_PERCENT", 0.30)?,
            max_total_exposure_percent: parse_f64("MAX_TOTAL_EXPOSURE_PERCENT", 0.70)?,
            min_cash_reserve_percent: parse_f64("MIN_CASH_RESERVE_PERCENT", 0.30)?,
            max_leverage: parse_u32("MAX_LEVERAGE", 2)?,
            force_leverage_one: parse_bool("FORCE_LEVERAGE_ONE", false),
            large_order_threshold: parse_f64("LARGE_ORDER_THRESHOLD", 0.10)?,
            max_price_deviation: parse_f64("MAX_PRICE_DEVIATION", 0.0)?,
            max_order_notional: parse_f64("MAX_ORDER_NOTIONAL", 0.0)?,
        };
        risk.validate()
            .map_err(|e| anyhow::anyhow!("invalid risk configuration: {e}"))?;

        let risk_repo_type = env::var("RISK_REPO_TYPE")
            .unwrap_or_else(|_| "memory".to_string())
            .parse::<RiskRepoKind>()?;

        Ok(Self {
            risk,
            risk_repo_type,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/tradegate.db".to_string()),
            sync_interval: Duration::from_secs(parse_u64("SYNC_INTERVAL_SECS", 5)?),
            auto_sync: parse_bool("AUTO_SYNC", false),
        })
    }
}

fn parse_u32(key: &str, default: u32) -> Result<u32> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<u32>()
        .context(format!("Failed to parse {}", key))
}

fn parse_u64(key: &str, default: u64) -> Result<u64> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<u64>()
        .context(format!("Failed to parse {}", key))
}

fn parse_f64(key: &str, default: f64) -> Result<f64> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<f64>()
        .context(format!("Failed to parse {}", key))
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<bool>()
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let config = CoreConfig::from_env().expect("defaults should parse");
        assert_eq!(config.risk.max_consecutive_losses, 3);
        assert_eq!(config.risk.max_daily_drawdown, 0.05);
        assert_eq!(config.risk.max_total_mdd, 0.15);
        assert_eq!(config.risk.max_single_position_percent, 0.30);
        assert_eq!(config.risk.max_total_exposure_percent, 0.70);
        assert_eq!(config.risk.min_cash_reserve_percent, 0.30);
        assert_eq!(config.risk.max_leverage, 2);
        assert_eq!(config.risk_repo_type, RiskRepoKind::Memory);
        assert_eq!(config.sync_interval, Duration::from_secs(5));
        assert!(!config.auto_sync);
    }

    #[test]
    fn repo_kind_parsing() {
        assert_eq!("memory".parse::<RiskRepoKind>().unwrap(), RiskRepoKind::Memory);
        assert_eq!("Durable".parse::<RiskRepoKind>().unwrap(), RiskRepoKind::Durable);
        assert!("redis".parse::<RiskRepoKind>().is_err());
    }
}
