pub mod ledger;
pub mod sizer;

#[cfg(test)]
mod tests;

pub use ledger::PortfolioLedger;
pub use sizer::{size_position, RiskLimits, SizingRequest};
