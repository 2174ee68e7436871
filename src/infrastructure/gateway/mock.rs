//! Simulated spot exchange for backtests and integration tests.
//!
//! Orders fill instantly against the configured mark price with taker fees
//! and slippage applied to the balance ledger. Placement is idempotent by
//! `client_order_id`, matching real venue semantics.

use crate::domain::clock::Clock;
use crate::domain::errors::CoreError;
use crate::domain::money::Money;
use crate::domain::order::{MarketType, Order, OrderSide, OrderStatus, OrderType};
use crate::domain::ports::{
    SpotBalance, SpotCancelOrderRequest, SpotGateway, SpotPlaceOrderRequest,
};
use crate::infrastructure::gateway::symbols::SymbolTable;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct MockExchangeConfig {
    pub taker_fee: Money,
    pub maker_fee: Money,
    /// Fill orders synchronously on placement.
    pub instant_fill: bool,
    /// Price impact applied to market fills, as a fraction.
    pub slippage: Money,
}

impl Default for MockExchangeConfig {
    fn default() -> Self {
        Self {
            taker_fee: Money::parse("0.001").expect("fee literal"),
            maker_fee: Money::parse("0.001").expect("fee literal"),
            instant_fill: true,
            slippage: Money::parse("0.0005").expect("slippage literal"),
        }
    }
}

struct ExchangeBook {
    orders: HashMap<String, Order>,
    balances: HashMap<String, SpotBalance>,
    prices: HashMap<String, Money>,
}

pub struct MockSpotExchange {
    book: RwLock<ExchangeBook>,
    config: MockExchangeConfig,
    symbols: SymbolTable,
    clock: Arc<dyn Clock>,
}

impl MockSpotExchange {
    pub fn new(initial_balances: HashMap<String, Money>, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(initial_balances, MockExchangeConfig::default(), clock)
    }

    pub fn with_config(
        initial_balances: HashMap<String, Money>,
        config: MockExchangeConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        let balances = initial_balances
            .into_iter()
            .map(|(asset, amount)| {
                (
                    asset.clone(),
                    SpotBalance {
                        asset,
                        free: amount,
                        locked: Money::zero(),
                        total: amount,
                        updated_at: now,
                    },
                )
            })
            .collect();

        Self {
            book: RwLock::new(ExchangeBook {
                orders: HashMap::new(),
                balances,
                prices: HashMap::new(),
            }),
            config,
            symbols: SymbolTable::new(),
            clock,
        }
    }

    /// Register venue symbol metadata (base/quote split).
    pub fn register_symbol(&self, symbol: &str, base: &str, quote: &str) {
        self.symbols.register(symbol, base, quote);
    }

    /// Set the mark price used for market fills.
    pub async fn set_price(&self, symbol: &str, price: Money) {
        self.book
            .write()
            .await
            .prices
            .insert(symbol.to_string(), price);
    }

    /// Count of orders the venue has accepted; lets tests assert exactly
    /// how many placements reached the gateway.
    pub async fn order_count(&self) -> usize {
        self.book.read().await.orders.len()
    }

    fn fill_order(&self, book: &mut ExchangeBook, order: &mut Order) -> Result<(), CoreError> {
        let mut fill_price = order.price;
        if order.order_type == OrderType::Market {
            let mark = book.prices.get(&order.symbol).copied().ok_or_else(|| {
                CoreError::Gateway(format!("no market price for {}", order.symbol))
            })?;
            let slip = mark * self.config.slippage;
            fill_price = match order.side {
                OrderSide::Buy => mark + slip,
                OrderSide::Sell => mark - slip,
            };
        }

        let (base_asset, quote_asset) = self.symbols.split(&order.symbol);
        let now = self.clock.now();

        match order.side {
            OrderSide::Buy => {
                let cost = fill_price * order.quantity;
                let fee = cost * self.config.taker_fee;
                let total_cost = cost + fee;

                let quote = book.balances.get_mut(&quote_asset).ok_or_else(|| {
                    CoreError::Gateway(format!("insufficient {quote_asset} balance"))
                })?;
                if quote.free < total_cost {
                    return Err(CoreError::Gateway(format!(
                        "insufficient {quote_asset} balance"
                    )));
                }
                quote.free -= total_cost;
                quote.total = quote.free + quote.locked;
                quote.updated_at = now;

                let base = book
                    .balances
                    .entry(base_asset.clone())
                    .or_insert_with(|| SpotBalance {
                        asset: base_asset.clone(),
                        free: Money::zero(),
                        locked: Money::zero(),
                        total: Money::zero(),
                        updated_at: now,
                    });
                base.free += order.quantity;
                base.total = base.free + base.locked;
                base.updated_at = now;
            }
            OrderSide::Sell => {
                let base = book.balances.get_mut(&base_asset).ok_or_else(|| {
                    CoreError::Gateway(format!("insufficient {base_asset} balance"))
                })?;
                if base.free < order.quantity {
                    return Err(CoreError::Gateway(format!(
                        "insufficient {base_asset} balance"
                    )));
                }
                base.free -= order.quantity;
                base.total = base.free + base.locked;
                base.updated_at = now;

                let revenue = fill_price * order.quantity;
                let fee = revenue * self.config.taker_fee;
                let net = revenue - fee;

                let quote = book
                    .balances
                    .entry(quote_asset.clone())
                    .or_insert_with(|| SpotBalance {
                        asset: quote_asset.clone(),
                        free: Money::zero(),
                        locked: Money::zero(),
                        total: Money::zero(),
                        updated_at: now,
                    });
                quote.free += net;
                quote.total = quote.free + quote.locked;
                quote.updated_at = now;
            }
        }

        order.filled = order.quantity;
        order.status = OrderStatus::Filled;
        order.submit_time = Some(now);
        order.fill_time = Some(now);
        order.updated_at = now;
        Ok(())
    }
}

#[async_trait]
impl SpotGateway for MockSpotExchange {
    async fn place_order(&self, req: &SpotPlaceOrderRequest) -> Result<Order, CoreError> {
        let mut book = self.book.write().await;

        if let Some(existing) = book.orders.get(&req.client_order_id) {
            return Ok(existing.clone());
        }

        let now = self.clock.now();
        let mut order = Order {
            client_order_id: req.client_order_id.clone(),
            exchange_id: Some(format!("MOCK-{}", Uuid::new_v4().simple())),
            symbol: req.symbol.clone(),
            market_type: MarketType::Spot,
            side: req.side,
            order_type: req.order_type,
            price: req.price,
            quantity: req.quantity,
            filled: Money::zero(),
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            submit_time: None,
            fill_time: None,
            leverage: 0,
            reduce_only: false,
            protect_price: req.protect_price,
        };

        if self.config.instant_fill {
            if let Err(e) = self.fill_order(&mut book, &mut order) {
                order.status = OrderStatus::Rejected;
                order.updated_at = now;
                book.orders.insert(req.client_order_id.clone(), order);
                return Err(e);
            }
        }

        book.orders.insert(req.client_order_id.clone(), order.clone());
        Ok(order)
    }

    async fn cancel_order(&self, req: &SpotCancelOrderRequest) -> Result<(), CoreError> {
        let mut book = self.book.write().await;
        let now = self.clock.now();

        let order = book
            .orders
            .get_mut(&req.client_order_id)
            .ok_or_else(|| CoreError::NotFound(format!("order {}", req.client_order_id)))?;

        if order.is_closed() {
            return Err(CoreError::Gateway(format!(
                "order {} already closed",
                req.client_order_id
            )));
        }

        order.status = OrderStatus::Cancelled;
        order.updated_at = now;
        Ok(())
    }

    async fn get_order(&self, client_order_id: &str) -> Result<Order, CoreError> {
        let book = self.book.read().await;
        book.orders
            .get(client_order_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("order {client_order_id}")))
    }

    async fn get_balance(&self, asset: &str) -> Result<SpotBalance, CoreError> {
        let book = self.book.read().await;
        Ok(book.balances.get(asset).cloned().unwrap_or(SpotBalance {
            asset: asset.to_string(),
            free: Money::zero(),
            locked: Money::zero(),
            total: Money::zero(),
            updated_at: self.clock.now(),
        }))
    }

    async fn get_all_balances(&self) -> Result<Vec<SpotBalance>, CoreError> {
        let book = self.book.read().await;
        Ok(book.balances.values().cloned().collect())
    }
}
