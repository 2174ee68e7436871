//! Order management system.
//!
//! Enforces the sequence risk-check -> place -> persist -> track for every
//! order, and reconciles active orders against the gateway on a timer.
//! `client_order_id` is the sole idempotency key; the OMS never mints ids.

use crate::application::risk::{OrderContext, RiskManager};
use crate::domain::errors::CoreError;
use crate::domain::money::Money;
use crate::domain::order::{MarketType, Order, OrderStatus};
use crate::domain::ports::{
    OrderPlacer, PlaceOrderRequest, SpotCancelOrderRequest, SpotGateway, SpotPlaceOrderRequest,
};
use crate::domain::repositories::OrderRepository;
use crate::infrastructure::observability::Metrics;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct OmsConfig {
    /// Gateway reconciliation interval for active orders.
    pub sync_interval: Duration,
    pub auto_sync: bool,
}

impl Default for OmsConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(5),
            auto_sync: false,
        }
    }
}

struct AutoSyncTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct OrderManager {
    gateway: Arc<dyn SpotGateway>,
    order_repo: Arc<dyn OrderRepository>,
    risk: Arc<RiskManager>,
    config: OmsConfig,
    metrics: Metrics,
    auto_sync: Mutex<Option<AutoSyncTask>>,
}

impl OrderManager {
    pub fn new(
        gateway: Arc<dyn SpotGateway>,
        order_repo: Arc<dyn OrderRepository>,
        risk: Arc<RiskManager>,
        config: OmsConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            gateway,
            order_repo,
            risk,
            config,
            metrics,
            auto_sync: Mutex::new(None),
        }
    }

    /// Place an order: risk check, gateway dispatch, persistence, metrics.
    ///
    /// Replaying a `client_order_id` returns the stored order without a
    /// second gateway call. A `Reduce` decision transparently substitutes
    /// the suggested quantity.
    pub async fn place_order(&self, req: PlaceOrderRequest) -> Result<Order, CoreError> {
        // idempotent replay; a miss here is the normal first-placement path
        match self.order_repo.get_order(&req.client_order_id).await {
            Ok(existing) => {
                debug!(id = %req.client_order_id, "place_order replay, returning stored order");
                return Ok(existing);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let order_ctx = OrderContext {
            client_order_id: req.client_order_id.clone(),
            symbol: req.symbol.clone(),
            market_type: MarketType::Spot,
            side: req.side,
            order_type: req.order_type,
            price: req.price,
            quantity: req.quantity,
            leverage: 0,
            reduce_only: false,
            protect_price: req.protect_price,
            current_price: req.current_price,
            account_id: req.account_id.clone(),
        };

        let decision = self.risk.check_pre_trade(&order_ctx).await?;

        if decision.is_blocked() {
            return Err(CoreError::RiskRejected {
                rule: decision.triggered_rule,
                reason: decision.reason,
            });
        }

        let mut quantity = req.quantity;
        if decision.should_reduce() {
            if let Some(suggested) = decision
                .suggested_quantity
                .as_deref()
                .and_then(|s| Money::parse(s).ok())
            {
                info!(
                    id = %req.client_order_id,
                    original = %req.quantity,
                    reduced = %suggested,
                    rule = %decision.triggered_rule,
                    "risk manager downsized order"
                );
                quantity = suggested;
            }
        }

        let gateway_req = SpotPlaceOrderRequest {
            client_order_id: req.client_order_id.clone(),
            symbol: req.symbol.clone(),
            side: req.side,
            order_type: req.order_type,
            price: req.price,
            quantity,
            protect_price: req.protect_price,
        };

        let started = Instant::now();
        let order = match self.gateway.place_order(&gateway_req).await {
            Ok(order) => order,
            Err(e) => {
                self.metrics.orders_rejected_total.inc();
                return Err(e);
            }
        };
        let elapsed = started.elapsed().as_secs_f64();
        self.metrics.gateway_latency_seconds.observe(elapsed);
        self.metrics.order_latency_seconds.observe(elapsed);

        // The order is live on the exchange from here on. A failed write is
        // surfaced but not retracted; auto-sync re-homes the order.
        if let Err(e) = self.order_repo.save_order(&order).await {
            warn!(id = %order.client_order_id, error = %e, "order persisted late, left to reconciliation");
            return Err(CoreError::Persistence(format!(
                "order {} placed but not persisted: {e}",
                order.client_order_id
            )));
        }

        self.metrics.orders_total.inc();
        if order.is_filled() {
            self.metrics.orders_filled_total.inc();
        }

        Ok(order)
    }

    /// Cancel a locally-known active order through the gateway.
    pub async fn cancel_order(&self, client_order_id: &str) -> Result<(), CoreError> {
        let order = self.order_repo.get_order(client_order_id).await?;

        if order.is_closed() {
            return Err(CoreError::TerminalState {
                client_order_id: client_order_id.to_string(),
                status: order.status.to_string(),
            });
        }

        let cancel_req = SpotCancelOrderRequest {
            client_order_id: client_order_id.to_string(),
            exchange_id: order.exchange_id.clone(),
            symbol: order.symbol.clone(),
        };
        self.gateway.cancel_order(&cancel_req).await?;

        self.order_repo
            .update_order_status(client_order_id, OrderStatus::Cancelled)
            .await?;
        self.metrics.orders_cancelled_total.inc();
        Ok(())
    }

    /// Local-first order lookup; on a local miss the gateway snapshot is
    /// fetched and persisted.
    pub async fn get_order(&self, client_order_id: &str) -> Result<Order, CoreError> {
        match self.order_repo.get_order(client_order_id).await {
            Ok(order) => return Ok(order),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let order = self.gateway.get_order(client_order_id).await?;
        self.order_repo.save_order(&order).await?;
        Ok(order)
    }

    /// Pull one order's status and fill from the gateway into the repo.
    pub async fn sync_order_status(&self, client_order_id: &str) -> Result<(), CoreError> {
        let gateway_order = self.gateway.get_order(client_order_id).await?;

        let local = match self.order_repo.get_order(client_order_id).await {
            Ok(order) => order,
            Err(e) if e.is_not_found() => {
                // not seen locally (e.g. persistence failed after placement)
                return self.order_repo.save_order(&gateway_order).await;
            }
            Err(e) => return Err(e),
        };

        if local.status != gateway_order.status {
            match self
                .order_repo
                .update_order_status(client_order_id, gateway_order.status)
                .await
            {
                Ok(()) => {}
                // local terminal status is sticky against a stale gateway read
                Err(CoreError::TerminalState { .. }) => {
                    debug!(id = %client_order_id, "skipping stale gateway status");
                }
                Err(e) => return Err(e),
            }
        }

        if local.filled != gateway_order.filled {
            self.order_repo
                .update_filled(client_order_id, gateway_order.filled)
                .await?;
        }

        Ok(())
    }

    /// Reconcile every active order. Errors accumulate; the loop never
    /// aborts early, and the last error is surfaced.
    pub async fn sync_active_orders(&self) -> Result<(), CoreError> {
        let active = self.order_repo.list_active_orders().await?;

        let mut last_err = None;
        for order in active {
            if let Err(e) = self.sync_order_status(&order.client_order_id).await {
                warn!(id = %order.client_order_id, error = %e, "order sync failed");
                last_err = Some(e);
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Start the background reconciliation loop if configured. A second
    /// call while the loop runs is a no-op.
    pub fn start_auto_sync(self: &Arc<Self>) {
        if !self.config.auto_sync {
            return;
        }

        let mut guard = self.auto_sync.lock().expect("auto-sync lock poisoned");
        if guard.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.sync_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // the first tick completes immediately; skip it so the loop
            // waits a full interval before the first pass
            ticker.tick().await;

            loop {
                let stopped = tokio::select! {
                    _ = ticker.tick() => false,
                    changed = stop_rx.changed() => changed.is_err() || *stop_rx.borrow(),
                };
                if stopped {
                    break;
                }
                if let Err(e) = manager.sync_active_orders().await {
                    warn!(error = %e, "auto-sync pass finished with errors");
                }
            }
            debug!("auto-sync loop drained");
        });

        *guard = Some(AutoSyncTask { stop_tx, handle });
        info!(interval = ?self.config.sync_interval, "auto-sync started");
    }

    /// Stop the reconciliation loop; the current iteration drains first.
    /// Idempotent.
    pub fn stop_auto_sync(&self) {
        let task = self.auto_sync.lock().expect("auto-sync lock poisoned").take();
        if let Some(task) = task {
            // cooperative stop: the running iteration drains, then the task
            // observes the signal and exits
            let _ = task.stop_tx.send(true);
            drop(task.handle);
            info!("auto-sync stopped");
        }
    }
}

impl Drop for OrderManager {
    fn drop(&mut self) {
        self.stop_auto_sync();
    }
}

#[async_trait]
impl OrderPlacer for OrderManager {
    async fn place_order(&self, req: PlaceOrderRequest) -> Result<Order, CoreError> {
        OrderManager::place_order(self, req).await
    }

    async fn cancel_order(&self, client_order_id: &str) -> Result<(), CoreError> {
        OrderManager::cancel_order(self, client_order_id).await
    }
}
