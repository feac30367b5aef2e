use std::sync::Mutex;

use trading_core::{EngineError, MarginSummary, PortfolioState, Position, PositionSizing};

use crate::sizer::{size_position, SizingRequest};

/// Serialized owner of the portfolio snapshot.
///
/// Symbols are evaluated concurrently within a cycle, so the snapshot and
/// the capacity it implies live behind one lock: every approval re-checks
/// exposure and decrements available margin in the same critical section,
/// and two in-flight approvals can never jointly overallocate.
pub struct PortfolioLedger {
    state: Mutex<PortfolioState>,
}

impl PortfolioLedger {
    pub fn new(capital: f64) -> Self {
        Self {
            state: Mutex::new(PortfolioState::new(capital)),
        }
    }

    /// Replace the snapshot with fresh broker data before a cycle.
    pub fn refresh(&self, margins: MarginSummary, positions: Vec<Position>) {
        let mut state = self.state.lock().unwrap();
        state.available_margin = margins.available;
        state.deployed_capital = positions
            .iter()
            .map(|p| (p.quantity as f64 * p.avg_price).abs())
            .sum();
        state.exposure_pct = if state.capital > 0.0 {
            state.deployed_capital / state.capital * 100.0
        } else {
            0.0
        };
        state.positions = positions;
    }

    pub fn snapshot(&self) -> PortfolioState {
        self.state.lock().unwrap().clone()
    }

    /// Size a trade and, if approved, reserve its capital atomically.
    pub fn size_and_reserve(
        &self,
        req: &SizingRequest<'_>,
    ) -> Result<PositionSizing, EngineError> {
        let mut state = self.state.lock().unwrap();
        let sizing = size_position(req, &state)?;
        if sizing.approved {
            state.deployed_capital += sizing.capital_allocated;
            state.available_margin -= sizing.capital_allocated;
            state.exposure_pct = if state.capital > 0.0 {
                state.deployed_capital / state.capital * 100.0
            } else {
                0.0
            };
            tracing::debug!(
                "Reserved {:.0} for {} (deployed {:.0}, margin left {:.0})",
                sizing.capital_allocated,
                sizing.symbol,
                state.deployed_capital,
                state.available_margin
            );
        }
        Ok(sizing)
    }

    /// Return reserved capital after a failed or abandoned placement.
    pub fn release(&self, sizing: &PositionSizing) {
        if !sizing.approved {
            return;
        }
        let mut state = self.state.lock().unwrap();
        state.deployed_capital = (state.deployed_capital - sizing.capital_allocated).max(0.0);
        state.available_margin += sizing.capital_allocated;
        state.exposure_pct = if state.capital > 0.0 {
            state.deployed_capital / state.capital * 100.0
        } else {
            0.0
        };
    }
}
