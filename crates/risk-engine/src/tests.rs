use std::sync::Arc;

use trading_core::{MarginSummary, PortfolioState, SignalAction, TradeDecision};

use crate::ledger::PortfolioLedger;
use crate::sizer::{size_position, RiskLimits, SizingRequest};

fn decision(confidence: f64) -> TradeDecision {
    TradeDecision {
        symbol: "RELIANCE".to_string(),
        action: SignalAction::Buy,
        confidence,
        conflict_notes: vec![],
    }
}

fn request<'a>(
    decision: &'a TradeDecision,
    capital: f64,
    risk_appetite: f64,
    entry: f64,
    stop_loss: f64,
) -> SizingRequest<'a> {
    SizingRequest {
        decision,
        capital,
        risk_appetite,
        entry,
        stop_loss,
        target: None,
    }
}

#[test]
fn limits_are_linear_in_appetite() {
    let low = RiskLimits::from_appetite(0.0);
    assert!((low.risk_per_trade_pct - 0.5).abs() < 1e-9);
    assert!((low.max_per_instrument_pct - 10.0).abs() < 1e-9);
    assert!((low.max_total_exposure_pct - 50.0).abs() < 1e-9);
    assert!((low.min_confidence - 0.8).abs() < 1e-9);

    let high = RiskLimits::from_appetite(1.0);
    assert!((high.risk_per_trade_pct - 2.0).abs() < 1e-9);
    assert!((high.max_per_instrument_pct - 25.0).abs() < 1e-9);
    assert!((high.max_total_exposure_pct - 90.0).abs() < 1e-9);
    assert!((high.min_confidence - 0.6).abs() < 1e-9);

    // Midpoint of every formula
    let mid = RiskLimits::from_appetite(0.5);
    assert!((mid.risk_per_trade_pct - 1.25).abs() < 1e-9);
    assert!((mid.max_per_instrument_pct - 17.5).abs() < 1e-9);
    assert!((mid.max_total_exposure_pct - 70.0).abs() < 1e-9);
    assert!((mid.min_confidence - 0.7).abs() < 1e-9);

    // Linearity: the quarter point sits exactly between the ends
    let q = RiskLimits::from_appetite(0.25);
    assert!((q.risk_per_trade_pct - (0.5 + 1.5 * 0.25)).abs() < 1e-9);
    assert!((q.max_per_instrument_pct - (10.0 + 15.0 * 0.25)).abs() < 1e-9);
}

#[test]
fn appetite_is_clamped_to_unit_interval() {
    let over = RiskLimits::from_appetite(3.0);
    assert!((over.risk_per_trade_pct - 2.0).abs() < 1e-9);
    let under = RiskLimits::from_appetite(-1.0);
    assert!((under.min_confidence - 0.8).abs() < 1e-9);
}

#[test]
fn reference_scenario_clamps_to_instrument_cap() {
    // capital 1,000,000 / appetite 0.5 / entry 100 / stop 95:
    // risk 1.25% = 12,500; raw qty 2,500; value 250,000 exceeds the
    // 17.5% cap of 175,000, so quantity clamps to 1,750.
    let d = decision(0.9);
    let req = request(&d, 1_000_000.0, 0.5, 100.0, 95.0);
    let sizing = size_position(&req, &PortfolioState::new(1_000_000.0)).unwrap();

    assert!(sizing.approved);
    assert_eq!(sizing.quantity, 1_750);
    assert!((sizing.capital_allocated - 175_000.0).abs() < 1e-6);
    assert!((sizing.capital_pct - 17.5).abs() < 1e-9);

    let limits = RiskLimits::from_appetite(0.5);
    assert!(sizing.capital_allocated <= 1_000_000.0 * limits.max_per_instrument_pct / 100.0);
}

#[test]
fn zero_stop_distance_is_an_error() {
    let d = decision(0.9);
    let req = request(&d, 100_000.0, 0.5, 100.0, 100.0);
    assert!(matches!(
        size_position(&req, &PortfolioState::new(100_000.0)),
        Err(trading_core::EngineError::InvalidStopLoss)
    ));
}

#[test]
fn low_confidence_is_rejected_with_reason() {
    let d = decision(0.5);
    let req = request(&d, 1_000_000.0, 0.5, 100.0, 95.0);
    let sizing = size_position(&req, &PortfolioState::new(1_000_000.0)).unwrap();

    assert!(!sizing.approved);
    assert_eq!(sizing.quantity, 0);
    let reason = sizing.rejection_reason.unwrap();
    assert!(reason.contains("confidence"));
}

#[test]
fn exposure_limit_is_enforced() {
    let d = decision(0.9);
    let mut portfolio = PortfolioState::new(1_000_000.0);
    portfolio.deployed_capital = 650_000.0; // 65% of capital already out
    let req = request(&d, 1_000_000.0, 0.5, 100.0, 95.0); // cap allows 70% total

    let sizing = size_position(&req, &portfolio).unwrap();
    assert!(!sizing.approved);
    assert!(sizing.rejection_reason.unwrap().contains("exposure"));
}

#[test]
fn insufficient_margin_is_rejected() {
    let d = decision(0.9);
    let mut portfolio = PortfolioState::new(1_000_000.0);
    portfolio.available_margin = 50_000.0;
    let req = request(&d, 1_000_000.0, 0.5, 100.0, 95.0);

    let sizing = size_position(&req, &portfolio).unwrap();
    assert!(!sizing.approved);
    assert!(sizing.rejection_reason.unwrap().contains("margin"));
}

#[test]
fn ledger_refresh_recomputes_exposure() {
    let ledger = PortfolioLedger::new(1_000_000.0);
    ledger.refresh(
        MarginSummary {
            available: 800_000.0,
            used: 200_000.0,
        },
        vec![trading_core::Position {
            symbol: "INFY".to_string(),
            quantity: 100,
            avg_price: 2_000.0,
            last_price: 2_010.0,
            pnl: 1_000.0,
            product: trading_core::ProductType::Intraday,
        }],
    );
    let snap = ledger.snapshot();
    assert!((snap.deployed_capital - 200_000.0).abs() < 1e-9);
    assert!((snap.exposure_pct - 20.0).abs() < 1e-9);
}

#[tokio::test]
async fn concurrent_approvals_cannot_jointly_overallocate() {
    // 70% exposure cap at appetite 0.5; each approved trade takes 17.5%.
    // Out of many concurrent attempts, at most 4 may be approved.
    let ledger = Arc::new(PortfolioLedger::new(1_000_000.0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            let d = decision(0.9);
            let req = request(&d, 1_000_000.0, 0.5, 100.0, 95.0);
            ledger.size_and_reserve(&req).unwrap()
        }));
    }

    let mut approved = 0;
    for handle in handles {
        if handle.await.unwrap().approved {
            approved += 1;
        }
    }

    assert!(approved <= 4, "approved {approved} trades past the cap");
    let snap = ledger.snapshot();
    assert!(snap.deployed_capital <= 700_000.0 + 1e-6);
}

#[test]
fn release_returns_reserved_capital() {
    let ledger = PortfolioLedger::new(1_000_000.0);
    let d = decision(0.9);
    let req = request(&d, 1_000_000.0, 0.5, 100.0, 95.0);

    let sizing = ledger.size_and_reserve(&req).unwrap();
    assert!(sizing.approved);
    assert!(ledger.snapshot().deployed_capital > 0.0);

    ledger.release(&sizing);
    let snap = ledger.snapshot();
    assert!((snap.deployed_capital - 0.0).abs() < 1e-9);
    assert!((snap.available_margin - 1_000_000.0).abs() < 1e-9);
}
