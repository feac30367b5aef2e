use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use broker_api::BrokerClient;
use trading_core::{
    EngineError, MarginSummary, OrderRequest, OrderSnapshot, OrderStatus, OrderType, Position,
};

/// Scriptable broker double: market orders fill instantly at 100.0,
/// stop orders rest OPEN, and failures can be injected per-attempt or
/// per-symbol.
pub struct MockBroker {
    attempts: AtomicUsize,
    fail_next: AtomicUsize,
    reject_all: Mutex<bool>,
    fail_symbols: Mutex<HashSet<String>>,
    placed: Mutex<Vec<OrderRequest>>,
    orders: Mutex<HashMap<String, OrderSnapshot>>,
    positions: Mutex<Vec<Position>>,
    cancelled: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

pub const MOCK_FILL_PRICE: f64 = 100.0;

impl MockBroker {
    pub fn new() -> Self {
        Self {
            attempts: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
            reject_all: Mutex::new(false),
            fail_symbols: Mutex::new(HashSet::new()),
            placed: Mutex::new(Vec::new()),
            orders: Mutex::new(HashMap::new()),
            positions: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Fail the next `n` placement attempts with a transient error.
    pub fn fail_next_placements(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Every placement for this symbol fails with a transient error.
    pub fn fail_symbol(&self, symbol: &str) {
        self.fail_symbols.lock().unwrap().insert(symbol.to_string());
    }

    /// Broker rejects every order instead of filling.
    pub fn reject_all(&self) {
        *self.reject_all.lock().unwrap() = true;
    }

    pub fn set_positions(&self, positions: Vec<Position>) {
        *self.positions.lock().unwrap() = positions;
    }

    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.placed.lock().unwrap().clone()
    }

    pub fn placement_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn cancelled_orders(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    async fn margins(&self) -> Result<MarginSummary, EngineError> {
        Ok(MarginSummary {
            available: 1_000_000.0,
            used: 0.0,
        })
    }

    async fn positions(&self) -> Result<Vec<Position>, EngineError> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<String, EngineError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.fail_symbols.lock().unwrap().contains(&order.symbol) {
            return Err(EngineError::Connectivity(format!(
                "gateway dropped order for {}",
                order.symbol
            )));
        }
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EngineError::Connectivity("request timed out".to_string()));
        }

        let order_id = format!("ORD-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.placed.lock().unwrap().push(order.clone());

        let snapshot = if *self.reject_all.lock().unwrap() {
            OrderSnapshot {
                order_id: order_id.clone(),
                status: OrderStatus::Rejected,
                filled_quantity: 0,
                pending_quantity: 0,
                average_price: None,
            }
        } else {
            match order.order_type {
                OrderType::Market | OrderType::Limit => OrderSnapshot {
                    order_id: order_id.clone(),
                    status: OrderStatus::Complete,
                    filled_quantity: order.quantity,
                    pending_quantity: 0,
                    average_price: Some(MOCK_FILL_PRICE),
                },
                OrderType::StopLossLimit | OrderType::StopLossMarket => OrderSnapshot {
                    order_id: order_id.clone(),
                    status: OrderStatus::Open,
                    filled_quantity: 0,
                    pending_quantity: order.quantity,
                    average_price: None,
                },
            }
        };
        self.orders.lock().unwrap().insert(order_id.clone(), snapshot);
        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), EngineError> {
        let mut orders = self.orders.lock().unwrap();
        let snapshot = orders
            .get_mut(order_id)
            .ok_or_else(|| EngineError::OrderFailure(format!("unknown order {order_id}")))?;
        snapshot.status = OrderStatus::Cancelled;
        snapshot.pending_quantity = 0;
        self.cancelled.lock().unwrap().push(order_id.to_string());
        Ok(())
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderSnapshot, EngineError> {
        self.orders
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .ok_or_else(|| EngineError::OrderFailure(format!("unknown order {order_id}")))
    }

    fn is_paper(&self) -> bool {
        true
    }

    fn broker_name(&self) -> &str {
        "mock"
    }
}
