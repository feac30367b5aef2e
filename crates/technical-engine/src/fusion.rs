use trading_core::{SignalAction, TechnicalSignal, TrendDirection};

use crate::momentum::{MomentumReading, VelocityTrend};
use crate::patterns::PatternScan;
use crate::snapshot::IndicatorSnapshot;
use crate::trend::TrendOutlook;

/// Stop distance in ATR multiples.
const STOP_ATR_MULT: f64 = 1.5;
/// Reward:risk used when no level exists in the signal's direction.
const FALLBACK_REWARD_RISK: f64 = 2.0;
/// Aligned indicator labels required to proceed past WAIT.
const MIN_ALIGNED_LABELS: usize = 2;

/// Upstream inputs for fusion. Each is optional: a producer that timed
/// out or failed is treated as absent, and fusion degrades conservatively
/// rather than guessing.
#[derive(Default)]
pub struct FusionInputs<'a> {
    pub snapshot: Option<&'a IndicatorSnapshot>,
    pub trend: Option<&'a TrendOutlook>,
    pub patterns: Option<&'a PatternScan>,
    pub momentum: Option<&'a MomentumReading>,
}

/// Fuse the four technical producers into one signal.
///
/// Trend is the master filter: contributions against it are discarded.
/// Momentum confirmation is mandatory; without it the result is WAIT no
/// matter what the rest says.
pub fn fuse(symbol: &str, inputs: &FusionInputs) -> TechnicalSignal {
    let momentum = match inputs.momentum {
        Some(m) => m,
        None => return TechnicalSignal::wait(symbol, "momentum validator unavailable"),
    };
    let snapshot = match inputs.snapshot {
        Some(s) => s,
        None => return TechnicalSignal::wait(symbol, "indicator snapshot unavailable"),
    };
    let trend = match inputs.trend {
        Some(t) => t,
        None => return TechnicalSignal::wait(symbol, "trend classification unavailable"),
    };

    let bull = snapshot.bullish_label_count();
    let bear = snapshot.bearish_label_count();

    // Master filter: only the trend-approved side survives
    let action = match trend.direction {
        TrendDirection::Bullish if bull >= MIN_ALIGNED_LABELS => SignalAction::Buy,
        TrendDirection::Bearish if bear >= MIN_ALIGNED_LABELS => SignalAction::Sell,
        TrendDirection::Neutral if bull >= MIN_ALIGNED_LABELS && bull > bear => SignalAction::Buy,
        TrendDirection::Neutral if bear >= MIN_ALIGNED_LABELS && bear > bull => SignalAction::Sell,
        _ => SignalAction::Wait,
    };

    if action == SignalAction::Wait {
        return TechnicalSignal::wait(
            symbol,
            format!(
                "fewer than {MIN_ALIGNED_LABELS} indicator signals aligned with the {:?} trend",
                trend.direction
            ),
        );
    }

    // Entry confirmation gate, never skipped
    if !momentum.confirmed() {
        return TechnicalSignal::wait(
            symbol,
            format!(
                "momentum not confirmed (volume {:.2}x, advice {:?})",
                momentum.volume_ratio, momentum.advice
            ),
        );
    }

    let entry = snapshot.current_price;
    if snapshot.atr <= 0.0 {
        return TechnicalSignal::wait(symbol, "no measurable volatility for stop placement");
    }
    let stop_distance = STOP_ATR_MULT * snapshot.atr;

    let levels = inputs.patterns.map(|p| &p.levels);
    let (stop_loss, target) = match action {
        SignalAction::Buy => {
            let stop = entry - stop_distance;
            let target = levels
                .and_then(|l| l.nearest_resistance)
                .unwrap_or(entry + FALLBACK_REWARD_RISK * stop_distance);
            (stop, target)
        }
        SignalAction::Sell => {
            let stop = entry + stop_distance;
            let target = levels
                .and_then(|l| l.nearest_support)
                .unwrap_or(entry - FALLBACK_REWARD_RISK * stop_distance);
            (stop, target)
        }
        SignalAction::Wait => unreachable!(),
    };

    let mut reasons = Vec::new();
    let mut confidence = match action {
        SignalAction::Buy => snapshot.bullish_score(),
        _ => snapshot.bearish_score(),
    };
    reasons.push(format!(
        "{}/4 indicator signals aligned ({:?} trend)",
        if action == SignalAction::Buy { bull } else { bear },
        trend.direction
    ));

    if let Some(scan) = inputs.patterns {
        let aligned_pattern = match action {
            SignalAction::Buy => scan.has_bullish(),
            _ => scan.has_bearish(),
        };
        if aligned_pattern && scan.levels.at_key_level {
            confidence += 0.1;
            reasons.push("pattern at key level".to_string());
        }
    }

    confidence += 0.1;
    reasons.push(format!(
        "momentum confirmed (volume {:.2}x)",
        momentum.volume_ratio
    ));

    // Any sub-signal actively fighting the chosen direction costs 0.2
    let opposing_pattern = inputs.patterns.map_or(false, |scan| match action {
        SignalAction::Buy => scan.has_bearish(),
        _ => scan.has_bullish(),
    });
    let opposing_labels = match action {
        SignalAction::Buy => bear >= MIN_ALIGNED_LABELS,
        _ => bull >= MIN_ALIGNED_LABELS,
    };
    if opposing_pattern || opposing_labels || momentum.velocity == VelocityTrend::Fading {
        confidence -= 0.2;
        reasons.push("conflicting sub-signal".to_string());
    }

    TechnicalSignal {
        symbol: symbol.to_string(),
        action,
        confidence: confidence.clamp(0.0, 1.0),
        entry: Some(entry),
        stop_loss: Some(stop_loss),
        target: Some(target),
        reasons,
    }
}
