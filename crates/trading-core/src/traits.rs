use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Candle, EngineError, Interval, Quote, SentimentAssessment};

/// Single capability interface for historical candles and live quotes.
/// Implementations wrap a vendor client or, for tests and dry runs, a
/// preloaded in-memory store.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fails with `NoData` when the vendor returns an empty series.
    async fn candles(
        &self,
        symbol: &str,
        interval: Interval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, EngineError>;

    async fn quote(&self, symbol: &str) -> Result<Quote, EngineError>;
}

/// Optional sentiment collaborator. When no implementation is wired in,
/// the decider treats sentiment as neutral and disables the rules that
/// depend on it.
#[async_trait]
pub trait SentimentSource: Send + Sync {
    async fn sentiment(&self, symbol: &str) -> Result<SentimentAssessment, EngineError>;
}
