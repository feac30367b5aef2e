pub mod config;
pub mod decider;
pub mod engine;
pub mod executor;
pub mod squareoff;
pub mod universe;

#[cfg(test)]
mod testkit;

pub use config::SessionConfig;
pub use decider::StrategyDecider;
pub use engine::TradeEngine;
pub use executor::{ExecutionReport, OrderExecutor, OrderState};
pub use squareoff::{MarketClock, SquareOffFailure, SquareOffResult, SquareOffScheduler};
