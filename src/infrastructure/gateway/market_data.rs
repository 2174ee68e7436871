//! Scripted market-data source for backtests.
//!
//! Subscriptions deliver over bounded channels (capacity 100); a slow
//! consumer blocks the producer, and the channel closes at end of stream.

use crate::domain::clock::Clock;
use crate::domain::errors::CoreError;
use crate::domain::market::{Candle, Tick};
use crate::domain::money::Money;
use crate::domain::ports::MarketDataRepo;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver};
use tokio::sync::RwLock;

const CHANNEL_CAPACITY: usize = 100;

pub struct MockMarketDataRepo {
    ticks: RwLock<Vec<Tick>>,
    candles: RwLock<Vec<Candle>>,
    latest_prices: RwLock<HashMap<String, Money>>,
    clock: Arc<dyn Clock>,
}

impl MockMarketDataRepo {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            ticks: RwLock::new(Vec::new()),
            candles: RwLock::new(Vec::new()),
            latest_prices: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Queue a tick for replay and remember it as the latest price.
    pub async fn push_tick(&self, symbol: &str, price: Money, volume: Money) {
        let now = self.clock.now();
        self.latest_prices
            .write()
            .await
            .insert(symbol.to_string(), price);
        self.ticks.write().await.push(Tick {
            symbol: symbol.to_string(),
            price,
            volume,
            event_time: now,
            recv_time: now,
        });
    }

    pub async fn push_candle(&self, candle: Candle) {
        self.latest_prices
            .write()
            .await
            .insert(candle.symbol.clone(), candle.close);
        self.candles.write().await.push(candle);
    }
}

#[async_trait]
impl MarketDataRepo for MockMarketDataRepo {
    async fn subscribe_ticks(&self, symbols: &[String]) -> Result<Receiver<Tick>, CoreError> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let wanted: Vec<String> = symbols.to_vec();
        let replay: Vec<Tick> = self
            .ticks
            .read()
            .await
            .iter()
            .filter(|t| wanted.contains(&t.symbol))
            .cloned()
            .collect();

        tokio::spawn(async move {
            for tick in replay {
                // a full channel blocks here until the consumer drains
                if tx.send(tick).await.is_err() {
                    return;
                }
            }
            // tx drops: end of stream closes the channel
        });

        Ok(rx)
    }

    async fn subscribe_klines(
        &self,
        symbols: &[String],
        interval: &str,
    ) -> Result<Receiver<Candle>, CoreError> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let wanted: Vec<String> = symbols.to_vec();
        let interval = interval.to_string();
        let replay: Vec<Candle> = self
            .candles
            .read()
            .await
            .iter()
            .filter(|c| wanted.contains(&c.symbol) && c.interval == interval)
            .cloned()
            .collect();

        tokio::spawn(async move {
            for candle in replay {
                if tx.send(candle).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }

    async fn get_historical_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>, CoreError> {
        let candles = self.candles.read().await;
        Ok(candles
            .iter()
            .filter(|c| {
                c.symbol == symbol
                    && c.interval == interval
                    && c.open_time.timestamp_millis() >= start_ms
                    && c.open_time.timestamp_millis() < end_ms
            })
            .cloned()
            .collect())
    }

    async fn get_latest_price(&self, symbol: &str) -> Result<Money, CoreError> {
        self.latest_prices
            .read()
            .await
            .get(symbol)
            .copied()
            .ok_or_else(|| CoreError::NotFound(format!("no price for {symbol}")))
    }
}
