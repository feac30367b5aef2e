use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use broker_api::BrokerClient;
use trading_core::{
    EngineError, OrderRequest, OrderSide, OrderStatus, PositionSizing, SignalAction,
};

pub const ENTRY_TAG: &str = "TRADE_ENGINE";
pub const STOP_TAG: &str = "TRADE_ENGINE_SL";

/// Poll delays (seconds) after the immediate status check.
const FILL_POLL_DELAYS: [u64; 3] = [1, 2, 4];

/// Executor-side order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    Requested,
    Placed,
    Filled,
    PartiallyFilled,
    Rejected,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone)]
struct TrackedOrder {
    symbol: String,
    side: OrderSide,
    state: OrderState,
    protective: bool,
}

/// Outcome of one entry placement, including the protective stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub symbol: String,
    pub order_id: Option<String>,
    pub state: OrderState,
    pub fill_price: Option<f64>,
    pub filled_quantity: i64,
    pub stop_order_id: Option<String>,
    pub stop_state: Option<OrderState>,
    pub error: Option<String>,
}

/// Places entry and protective stop orders and tracks their lifecycle.
/// All broker calls are blocking I/O with a single retry on transient
/// failure; once a placement is sent it is never cancelled from here.
pub struct OrderExecutor {
    broker: Arc<dyn BrokerClient>,
    halted: Arc<AtomicBool>,
    orders: DashMap<String, TrackedOrder>,
    /// symbol -> pending protective stop order id
    protective: DashMap<String, String>,
}

impl OrderExecutor {
    pub fn new(broker: Arc<dyn BrokerClient>, halted: Arc<AtomicBool>) -> Self {
        Self {
            broker,
            halted,
            orders: DashMap::new(),
            protective: DashMap::new(),
        }
    }

    pub fn halt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.halted)
    }

    /// One retry on transient errors; the second failure carries both causes.
    pub(crate) async fn place_with_retry(
        &self,
        order: &OrderRequest,
    ) -> Result<String, EngineError> {
        match self.broker.place_order(order).await {
            Ok(id) => Ok(id),
            Err(first) if first.is_transient() => {
                tracing::warn!(
                    "Transient failure placing {:?} {} x{}, retrying once: {}",
                    order.side,
                    order.symbol,
                    order.quantity,
                    first
                );
                self.broker.place_order(order).await.map_err(|second| {
                    EngineError::OrderFailure(format!(
                        "retry failed: {second} (first attempt: {first})"
                    ))
                })
            }
            Err(other) => Err(EngineError::OrderFailure(other.to_string())),
        }
    }

    /// Place the entry order for an approved sizing, wait for the fill,
    /// and protect it with an opposite-side stop at the planned stop loss.
    pub async fn execute_entry(&self, sizing: &PositionSizing) -> Result<ExecutionReport, EngineError> {
        if self.halted.load(Ordering::SeqCst) {
            return Err(EngineError::OrderFailure(
                "trading halted for square-off; entry refused".to_string(),
            ));
        }
        if !sizing.approved || sizing.quantity < 1 {
            return Err(EngineError::OrderFailure(format!(
                "sizing for {} not approved",
                sizing.symbol
            )));
        }
        let side = match sizing.action {
            SignalAction::Buy => OrderSide::Buy,
            SignalAction::Sell => OrderSide::Sell,
            SignalAction::Wait => {
                return Err(EngineError::OrderFailure(
                    "cannot execute a WAIT decision".to_string(),
                ))
            }
        };

        let entry_order =
            OrderRequest::market(&sizing.symbol, side, sizing.quantity).with_tag(ENTRY_TAG);
        self.orders.insert(
            sizing.symbol.clone(),
            TrackedOrder {
                symbol: sizing.symbol.clone(),
                side,
                state: OrderState::Requested,
                protective: false,
            },
        );

        let order_id = match self.place_with_retry(&entry_order).await {
            Ok(id) => id,
            Err(e) => {
                self.set_state(&sizing.symbol, OrderState::Failed);
                return Ok(ExecutionReport {
                    symbol: sizing.symbol.clone(),
                    order_id: None,
                    state: OrderState::Failed,
                    fill_price: None,
                    filled_quantity: 0,
                    stop_order_id: None,
                    stop_state: None,
                    error: Some(e.to_string()),
                });
            }
        };
        self.set_state(&sizing.symbol, OrderState::Placed);
        tracing::info!(
            "Placed {:?} {} x{} (order {})",
            side,
            sizing.symbol,
            sizing.quantity,
            order_id
        );

        let (state, fill_price, filled_quantity) = self.await_fill(&order_id).await?;
        self.set_state(&sizing.symbol, state);

        let mut report = ExecutionReport {
            symbol: sizing.symbol.clone(),
            order_id: Some(order_id),
            state,
            fill_price,
            filled_quantity,
            stop_order_id: None,
            stop_state: None,
            error: None,
        };

        // Protect whatever quantity actually filled
        if matches!(state, OrderState::Filled | OrderState::PartiallyFilled)
            && filled_quantity > 0
        {
            let stop_order = OrderRequest::stop_market(
                &sizing.symbol,
                side.opposite(),
                filled_quantity,
                sizing.stop_loss,
            )
            .with_tag(STOP_TAG);

            match self.place_with_retry(&stop_order).await {
                Ok(stop_id) => {
                    tracing::info!(
                        "Protective stop for {} at {:.2} (order {})",
                        sizing.symbol,
                        sizing.stop_loss,
                        stop_id
                    );
                    self.orders.insert(
                        stop_id.clone(),
                        TrackedOrder {
                            symbol: sizing.symbol.clone(),
                            side: side.opposite(),
                            state: OrderState::Placed,
                            protective: true,
                        },
                    );
                    self.protective.insert(sizing.symbol.clone(), stop_id.clone());
                    report.stop_order_id = Some(stop_id);
                    report.stop_state = Some(OrderState::Placed);
                }
                Err(e) => {
                    tracing::error!("Stop placement failed for {}: {}", sizing.symbol, e);
                    report.stop_state = Some(OrderState::Failed);
                    report.error = Some(e.to_string());
                }
            }
        }

        Ok(report)
    }

    /// Poll the broker until the order leaves the OPEN state or the poll
    /// budget runs out.
    async fn await_fill(
        &self,
        order_id: &str,
    ) -> Result<(OrderState, Option<f64>, i64), EngineError> {
        let mut delays = FILL_POLL_DELAYS.iter();
        loop {
            let snapshot = self.broker.order_status(order_id).await?;
            let resolved = match snapshot.status {
                OrderStatus::Complete => Some(OrderState::Filled),
                OrderStatus::Rejected => Some(OrderState::Rejected),
                OrderStatus::Cancelled => Some(OrderState::Cancelled),
                OrderStatus::PartiallyFilled | OrderStatus::Open => None,
            };
            if let Some(state) = resolved {
                return Ok((state, snapshot.average_price, snapshot.filled_quantity));
            }
            match delays.next() {
                Some(&secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => {
                    // Still working after the poll budget: report what we know
                    let state = if snapshot.filled_quantity > 0 {
                        OrderState::PartiallyFilled
                    } else {
                        OrderState::Placed
                    };
                    return Ok((state, snapshot.average_price, snapshot.filled_quantity));
                }
            }
        }
    }

    fn set_state(&self, key: &str, state: OrderState) {
        if let Some(mut entry) = self.orders.get_mut(key) {
            entry.state = state;
            tracing::debug!(
                "Order for {} ({:?}, protective={}) -> {:?}",
                entry.symbol,
                entry.side,
                entry.protective,
                state
            );
        }
    }

    /// Pending protective stop order for a symbol, if any.
    pub fn pending_protective_order(&self, symbol: &str) -> Option<String> {
        self.protective.get(symbol).map(|id| id.value().clone())
    }

    /// Cancel and forget the protective stop for a symbol.
    pub async fn cancel_protective(&self, symbol: &str) -> Result<(), EngineError> {
        if let Some((_, order_id)) = self.protective.remove(symbol) {
            self.broker.cancel_order(&order_id).await?;
            if let Some(mut entry) = self.orders.get_mut(&order_id) {
                entry.state = OrderState::Cancelled;
            }
            tracing::info!("Cancelled protective stop {} for {}", order_id, symbol);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::MockBroker;
    use trading_core::SignalAction;

    fn approved_sizing(symbol: &str, action: SignalAction, quantity: i64) -> PositionSizing {
        PositionSizing {
            symbol: symbol.to_string(),
            action,
            approved: true,
            quantity,
            entry: 100.0,
            stop_loss: 95.0,
            target: Some(110.0),
            capital_allocated: 100.0 * quantity as f64,
            capital_pct: 10.0,
            risk_amount: 5.0 * quantity as f64,
            risk_pct: 0.5,
            rejection_reason: None,
        }
    }

    fn executor(broker: Arc<MockBroker>) -> OrderExecutor {
        OrderExecutor::new(broker, Arc::new(AtomicBool::new(false)))
    }

    #[tokio::test]
    async fn fill_places_protective_stop() {
        let broker = Arc::new(MockBroker::new());
        let exec = executor(Arc::clone(&broker));

        let report = exec
            .execute_entry(&approved_sizing("INFY", SignalAction::Buy, 10))
            .await
            .unwrap();

        assert_eq!(report.state, OrderState::Filled);
        assert_eq!(report.filled_quantity, 10);
        assert_eq!(report.stop_state, Some(OrderState::Placed));

        let placed = broker.placed_orders();
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[1].side, OrderSide::Sell);
        assert_eq!(placed[1].trigger_price, Some(95.0));
        assert_eq!(placed[1].quantity, 10);
        assert!(exec.pending_protective_order("INFY").is_some());
    }

    #[tokio::test]
    async fn transient_failure_is_retried_exactly_once() {
        let broker = Arc::new(MockBroker::new());
        broker.fail_next_placements(1);
        let exec = executor(Arc::clone(&broker));

        let report = exec
            .execute_entry(&approved_sizing("INFY", SignalAction::Buy, 10))
            .await
            .unwrap();

        assert_eq!(report.state, OrderState::Filled);
        // One failed attempt + one successful retry + one stop order
        assert_eq!(broker.placement_attempts(), 3);
    }

    #[tokio::test]
    async fn second_transient_failure_surfaces_as_failed() {
        let broker = Arc::new(MockBroker::new());
        broker.fail_next_placements(2);
        let exec = executor(Arc::clone(&broker));

        let report = exec
            .execute_entry(&approved_sizing("INFY", SignalAction::Buy, 10))
            .await
            .unwrap();

        assert_eq!(report.state, OrderState::Failed);
        let error = report.error.unwrap();
        assert!(error.contains("retry failed"));
        assert!(error.contains("first attempt"));
        // Exactly two attempts, no third retry
        assert_eq!(broker.placement_attempts(), 2);
    }

    #[tokio::test]
    async fn rejected_entry_gets_no_stop() {
        let broker = Arc::new(MockBroker::new());
        broker.reject_all();
        let exec = executor(Arc::clone(&broker));

        let report = exec
            .execute_entry(&approved_sizing("INFY", SignalAction::Buy, 10))
            .await
            .unwrap();

        assert_eq!(report.state, OrderState::Rejected);
        assert!(report.stop_order_id.is_none());
        assert_eq!(broker.placed_orders().len(), 1);
    }

    #[tokio::test]
    async fn halted_executor_refuses_entries() {
        let broker = Arc::new(MockBroker::new());
        let exec = executor(Arc::clone(&broker));
        exec.halt_flag().store(true, Ordering::SeqCst);

        let err = exec
            .execute_entry(&approved_sizing("INFY", SignalAction::Buy, 10))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("halted"));
        assert!(broker.placed_orders().is_empty());
    }

    #[tokio::test]
    async fn sell_entry_places_buy_side_stop() {
        let broker = Arc::new(MockBroker::new());
        let exec = executor(Arc::clone(&broker));

        let mut sizing = approved_sizing("TCS", SignalAction::Sell, 5);
        sizing.stop_loss = 105.0;
        let report = exec.execute_entry(&sizing).await.unwrap();

        assert_eq!(report.state, OrderState::Filled);
        let placed = broker.placed_orders();
        assert_eq!(placed[0].side, OrderSide::Sell);
        assert_eq!(placed[1].side, OrderSide::Buy);
        assert_eq!(placed[1].trigger_price, Some(105.0));
    }
}
