use async_trait::async_trait;

use trading_core::{EngineError, MarginSummary, OrderRequest, OrderSnapshot, Position};

pub mod paper;

pub use paper::{PaperBroker, PaperMarketData};

// ---------------------------------------------------------------------------
// Broker trait (vendor-agnostic)
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Available and used margin for the equity segment
    async fn margins(&self) -> Result<MarginSummary, EngineError>;

    /// All open day positions
    async fn positions(&self) -> Result<Vec<Position>, EngineError>;

    /// Submit an order, returning the broker order id
    async fn place_order(&self, order: &OrderRequest) -> Result<String, EngineError>;

    /// Cancel a pending order by id
    async fn cancel_order(&self, order_id: &str) -> Result<(), EngineError>;

    /// Latest status of an order by id
    async fn order_status(&self, order_id: &str) -> Result<OrderSnapshot, EngineError>;

    /// Whether this is a paper/simulated account
    fn is_paper(&self) -> bool;

    /// Broker name for logging
    fn broker_name(&self) -> &str;
}
