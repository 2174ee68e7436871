//! Seam interfaces toward external collaborators.
//!
//! The OMS depends on `SpotGateway`, never on a concrete exchange; the
//! strategy engine depends on `OrderPlacer`, never on the OMS type. This
//! breaks the strategy -> OMS -> risk -> repo dependency cycle.

use crate::domain::errors::CoreError;
use crate::domain::market::{Candle, Tick};
use crate::domain::money::Money;
use crate::domain::order::{Order, OrderSide, OrderType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::Receiver;

#[derive(Debug, Clone)]
pub struct SpotPlaceOrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Limit price; zero for market orders.
    pub price: Money,
    pub quantity: Money,
    /// Worst acceptable fill price.
    pub protect_price: Money,
}

#[derive(Debug, Clone)]
pub struct SpotCancelOrderRequest {
    pub client_order_id: String,
    /// Either id may be used; client id wins when both are set.
    pub exchange_id: Option<String>,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpotBalance {
    pub asset: String,
    pub free: Money,
    pub locked: Money,
    pub total: Money,
    pub updated_at: DateTime<Utc>,
}

/// Spot exchange surface consumed by the OMS. Returned orders carry the
/// normalized status and filled quantity.
#[async_trait]
pub trait SpotGateway: Send + Sync {
    async fn place_order(&self, req: &SpotPlaceOrderRequest) -> Result<Order, CoreError>;

    async fn cancel_order(&self, req: &SpotCancelOrderRequest) -> Result<(), CoreError>;

    async fn get_order(&self, client_order_id: &str) -> Result<Order, CoreError>;

    async fn get_balance(&self, asset: &str) -> Result<SpotBalance, CoreError>;

    async fn get_all_balances(&self) -> Result<Vec<SpotBalance>, CoreError>;
}

/// Market-data surface consumed by the strategy loop. Subscriptions are
/// lazy bounded channels; the producer closes the channel at end of
/// stream, and a slow consumer blocks the producer.
#[async_trait]
pub trait MarketDataRepo: Send + Sync {
    async fn subscribe_ticks(&self, symbols: &[String]) -> Result<Receiver<Tick>, CoreError>;

    async fn subscribe_klines(
        &self,
        symbols: &[String],
        interval: &str,
    ) -> Result<Receiver<Candle>, CoreError>;

    /// `start_ms`/`end_ms` are Unix milliseconds.
    async fn get_historical_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>, CoreError>;

    async fn get_latest_price(&self, symbol: &str) -> Result<Money, CoreError>;
}

/// Fields a caller supplies when placing an order through the OMS. The
/// caller mints `client_order_id` and never reuses it for a semantically
/// different order.
#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Money,
    pub quantity: Money,
    /// Current market price, used for the notional of market orders.
    pub current_price: Money,
    pub account_id: String,
    pub protect_price: Money,
}

/// Minimal order-entry surface the strategy engine depends on.
#[async_trait]
pub trait OrderPlacer: Send + Sync {
    async fn place_order(&self, req: PlaceOrderRequest) -> Result<Order, CoreError>;

    async fn cancel_order(&self, client_order_id: &str) -> Result<(), CoreError>;
}
