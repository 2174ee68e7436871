//! Market-data snapshot types consumed by the strategy loop and the
//! market-data repository seam.

use crate::domain::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last-trade / best-price snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub price: Money,
    pub volume: Money,
    /// Event time at the venue; backtests replay on this.
    pub event_time: DateTime<Utc>,
    /// Local receive time.
    pub recv_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    /// "1m", "5m", "1h", "1d"
    pub interval: String,

    pub open: Money,
    pub high: Money,
    pub low: Money,
    pub close: Money,
    pub volume: Money,

    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }

    pub fn body(&self) -> Money {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> Money {
        self.high - self.low
    }
}
