use serde::{Deserialize, Serialize};
use trading_core::{EngineError, PortfolioState, PositionSizing, TradeDecision};

/// Capital limits derived linearly from risk appetite.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskLimits {
    pub risk_per_trade_pct: f64,
    pub max_per_instrument_pct: f64,
    pub max_total_exposure_pct: f64,
    pub min_confidence: f64,
}

impl RiskLimits {
    /// Interpolate the limit set for a risk appetite in [0, 1].
    ///
    /// risk/trade 0.5%..2%, per-instrument 10%..25%, total exposure
    /// 50%..90%, confidence floor 0.8..0.6.
    pub fn from_appetite(risk_appetite: f64) -> Self {
        let a = risk_appetite.clamp(0.0, 1.0);
        Self {
            risk_per_trade_pct: 0.5 + 1.5 * a,
            max_per_instrument_pct: 10.0 + 15.0 * a,
            max_total_exposure_pct: 50.0 + 40.0 * a,
            min_confidence: 0.8 - 0.2 * a,
        }
    }
}

/// One sizing request against a portfolio snapshot.
#[derive(Debug, Clone)]
pub struct SizingRequest<'a> {
    pub decision: &'a TradeDecision,
    pub capital: f64,
    pub risk_appetite: f64,
    pub entry: f64,
    pub stop_loss: f64,
    pub target: Option<f64>,
}

fn rejected(req: &SizingRequest<'_>, reason: String) -> PositionSizing {
    PositionSizing {
        symbol: req.decision.symbol.clone(),
        action: req.decision.action,
        approved: false,
        quantity: 0,
        entry: req.entry,
        stop_loss: req.stop_loss,
        target: req.target,
        capital_allocated: 0.0,
        capital_pct: 0.0,
        risk_amount: 0.0,
        risk_pct: 0.0,
        rejection_reason: Some(reason),
    }
}

/// Size a position against the given portfolio snapshot.
///
/// Pure function: callers that evaluate symbols concurrently must hold the
/// ledger lock around this call so the exposure check and the margin
/// reservation are one atomic step.
pub fn size_position(
    req: &SizingRequest<'_>,
    portfolio: &PortfolioState,
) -> Result<PositionSizing, EngineError> {
    let limits = RiskLimits::from_appetite(req.risk_appetite);

    let sl_distance = (req.entry - req.stop_loss).abs();
    if sl_distance == 0.0 {
        return Err(EngineError::InvalidStopLoss);
    }

    if req.decision.confidence < limits.min_confidence {
        return Ok(rejected(
            req,
            format!(
                "confidence {:.2} below minimum threshold {:.2}",
                req.decision.confidence, limits.min_confidence
            ),
        ));
    }

    let risk_amount = req.capital * limits.risk_per_trade_pct / 100.0;
    let raw_quantity = (risk_amount / sl_distance).floor() as i64;

    let max_position_value = req.capital * limits.max_per_instrument_pct / 100.0;
    let mut quantity = raw_quantity;
    let mut position_value = quantity as f64 * req.entry;
    if position_value > max_position_value {
        quantity = (max_position_value / req.entry).floor() as i64;
        position_value = quantity as f64 * req.entry;
    }

    if quantity < 1 {
        return Ok(rejected(
            req,
            format!(
                "risk budget {risk_amount:.0} too small for stop distance {sl_distance:.2}"
            ),
        ));
    }

    let projected_exposure = (portfolio.deployed_capital + position_value) / req.capital * 100.0;
    if projected_exposure > limits.max_total_exposure_pct {
        return Ok(rejected(
            req,
            format!(
                "projected exposure {projected_exposure:.1}% exceeds limit {:.1}%",
                limits.max_total_exposure_pct
            ),
        ));
    }

    if portfolio.available_margin < position_value {
        return Ok(rejected(
            req,
            format!(
                "available margin {:.0} below required {position_value:.0}",
                portfolio.available_margin
            ),
        ));
    }

    let actual_risk = quantity as f64 * sl_distance;
    Ok(PositionSizing {
        symbol: req.decision.symbol.clone(),
        action: req.decision.action,
        approved: true,
        quantity,
        entry: req.entry,
        stop_loss: req.stop_loss,
        target: req.target,
        capital_allocated: position_value,
        capital_pct: position_value / req.capital * 100.0,
        risk_amount: actual_risk,
        risk_pct: actual_risk / req.capital * 100.0,
        rejection_reason: None,
    })
}
