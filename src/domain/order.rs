//! Order domain model: identity, lifecycle and the status graph.
//!
//! Status graph: `Pending -> Submitted -> (PartialFilled <-> Submitted)
//! -> Filled | Cancelled | Rejected`. Terminal statuses are sticky and
//! transitions never rewind.

use crate::domain::errors::CoreError;
use crate::domain::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for OrderSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(CoreError::InvalidInput(format!("unknown order side: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
    /// Immediate-or-cancel
    Ioc,
    /// Fill-or-kill
    Fok,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Ioc => write!(f, "IOC"),
            OrderType::Fok => write!(f, "FOK"),
        }
    }
}

impl FromStr for OrderType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LIMIT" => Ok(OrderType::Limit),
            "MARKET" => Ok(OrderType::Market),
            "IOC" => Ok(OrderType::Ioc),
            "FOK" => Ok(OrderType::Fok),
            other => Err(CoreError::InvalidInput(format!("unknown order type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketType {
    Spot,
    Future,
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketType::Spot => write!(f, "SPOT"),
            MarketType::Future => write!(f, "FUTURE"),
        }
    }
}

impl FromStr for MarketType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SPOT" => Ok(MarketType::Spot),
            "FUTURE" => Ok(MarketType::Future),
            other => Err(CoreError::InvalidInput(format!("unknown market type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Submitted,
    PartialFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Terminal statuses are not further mutable.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    /// Monotonic progression rank. `Submitted` and `PartialFilled` share a
    /// rank so the two may oscillate while fills stream in.
    fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Submitted | OrderStatus::PartialFilled => 1,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected => 2,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::Submitted => write!(f, "SUBMITTED"),
            OrderStatus::PartialFilled => write!(f, "PARTIAL_FILLED"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "SUBMITTED" => Ok(OrderStatus::Submitted),
            "PARTIAL_FILLED" => Ok(OrderStatus::PartialFilled),
            "FILLED" => Ok(OrderStatus::Filled),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "REJECTED" => Ok(OrderStatus::Rejected),
            other => Err(CoreError::InvalidInput(format!("unknown order status: {other}"))),
        }
    }
}

/// Order domain model. Identity (`client_order_id`, `exchange_id`) is
/// immutable; status, filled quantity and timestamps are bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Caller-minted idempotency key, unique across the account's lifetime.
    pub client_order_id: String,
    pub exchange_id: Option<String>,

    pub symbol: String,
    pub market_type: MarketType,
    pub side: OrderSide,
    pub order_type: OrderType,

    /// Limit price; zero for market orders.
    pub price: Money,
    pub quantity: Money,
    pub filled: Money,

    pub status: OrderStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submit_time: Option<DateTime<Utc>>,
    pub fill_time: Option<DateTime<Utc>>,

    /// Futures-only; zero for spot.
    pub leverage: u32,
    pub reduce_only: bool,

    /// Worst acceptable fill price, carried for downstream slippage control.
    pub protect_price: Money,
}

impl Order {
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn filled_percent(&self) -> Money {
        if self.quantity.is_zero() {
            return Money::zero();
        }
        self.filled
            .checked_div(&self.quantity)
            .unwrap_or_else(|_| Money::zero())
    }

    pub fn remaining_qty(&self) -> Money {
        self.quantity - self.filled
    }

    /// Apply a status transition, refusing terminal mutation and rewinds.
    /// A no-op transition to the current status always succeeds.
    pub fn apply_status(&mut self, status: OrderStatus, now: DateTime<Utc>) -> Result<(), CoreError> {
        if status == self.status {
            return Ok(());
        }
        if self.status.is_terminal() || status.rank() < self.status.rank() {
            return Err(CoreError::TerminalState {
                client_order_id: self.client_order_id.clone(),
                status: self.status.to_string(),
            });
        }
        self.status = status;
        self.updated_at = now;
        if status == OrderStatus::Filled {
            self.fill_time = Some(now);
        }
        Ok(())
    }

    /// Merge a newer snapshot of the same order: status (terminal sticky),
    /// filled (never rewinds), exchange id and timestamps. Used by the
    /// repositories to keep `save_order` idempotent.
    pub fn merge(&mut self, incoming: &Order, now: DateTime<Utc>) {
        if self.exchange_id.is_none() {
            self.exchange_id = incoming.exchange_id.clone();
        }
        if !self.status.is_terminal() && incoming.status.rank() >= self.status.rank() {
            self.status = incoming.status;
        }
        if incoming.filled > self.filled {
            self.filled = incoming.filled;
        }
        if self.submit_time.is_none() {
            self.submit_time = incoming.submit_time;
        }
        if self.fill_time.is_none() {
            self.fill_time = incoming.fill_time;
        }
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_order(status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            client_order_id: "ord-1".to_string(),
            exchange_id: None,
            symbol: "BTCUSDT".to_string(),
            market_type: MarketType::Spot,
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            price: Money::from(dec!(50000)),
            quantity: Money::from(dec!(0.1)),
            filled: Money::zero(),
            status,
            created_at: now,
            updated_at: now,
            submit_time: None,
            fill_time: None,
            leverage: 0,
            reduce_only: false,
            protect_price: Money::zero(),
        }
    }

    #[test]
    fn status_display_round_trip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Submitted,
            OrderStatus::PartialFilled,
            OrderStatus::Filled,
            OrderStatus::Cancelled,
            OrderStatus::Rejected,
        ] {
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), status);
        }
    }

    #[test]
    fn forward_transitions_succeed() {
        let mut order = test_order(OrderStatus::Pending);
        let now = Utc::now();
        order.apply_status(OrderStatus::Submitted, now).unwrap();
        order.apply_status(OrderStatus::PartialFilled, now).unwrap();
        // fills may stream in bursts, dropping back to submitted between them
        order.apply_status(OrderStatus::Submitted, now).unwrap();
        order.apply_status(OrderStatus::Filled, now).unwrap();
        assert!(order.is_filled());
        assert!(order.fill_time.is_some());
    }

    #[test]
    fn no_transition_out_of_terminal() {
        for terminal in [OrderStatus::Filled, OrderStatus::Cancelled, OrderStatus::Rejected] {
            let mut order = test_order(terminal);
            let result = order.apply_status(OrderStatus::Submitted, Utc::now());
            assert!(matches!(result, Err(CoreError::TerminalState { .. })));
            assert_eq!(order.status, terminal);
        }
    }

    #[test]
    fn transitions_never_rewind() {
        let mut order = test_order(OrderStatus::Submitted);
        assert!(order.apply_status(OrderStatus::Pending, Utc::now()).is_err());
    }

    #[test]
    fn merge_keeps_terminal_status() {
        let mut stored = test_order(OrderStatus::Filled);
        stored.filled = Money::from(dec!(0.1));
        let mut incoming = test_order(OrderStatus::PartialFilled);
        incoming.filled = Money::from(dec!(0.05));

        stored.merge(&incoming, Utc::now());
        assert_eq!(stored.status, OrderStatus::Filled);
        assert_eq!(stored.filled, Money::from(dec!(0.1)));
    }

    #[test]
    fn merge_adopts_exchange_id_and_fill_progress() {
        let mut stored = test_order(OrderStatus::Submitted);
        let mut incoming = test_order(OrderStatus::PartialFilled);
        incoming.exchange_id = Some("EX-9".to_string());
        incoming.filled = Money::from(dec!(0.04));

        stored.merge(&incoming, Utc::now());
        assert_eq!(stored.exchange_id.as_deref(), Some("EX-9"));
        assert_eq!(stored.status, OrderStatus::PartialFilled);
        assert_eq!(stored.filled, Money::from(dec!(0.04)));
    }

    #[test]
    fn remaining_and_filled_percent() {
        let mut order = test_order(OrderStatus::PartialFilled);
        order.filled = Money::from(dec!(0.025));
        assert_eq!(order.remaining_qty(), Money::from(dec!(0.075)));
        assert_eq!(order.filled_percent(), Money::from(dec!(0.25)));
    }
}
