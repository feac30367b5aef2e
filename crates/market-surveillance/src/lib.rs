use trading_core::{
    Candle, EngineError, ManipulationAssessment, ManipulationRisk, Quote, TradeRecommendation,
};

pub const MIN_DAILY_BARS: usize = 20;
pub const MIN_INTRADAY_BARS: usize = 50;

const EXTREME_VOLUME_RATIO: f64 = 5.0;
const HIGH_VOLUME_RATIO: f64 = 3.0;
const PRICE_MOVE_PCT: f64 = 5.0;
const QUIET_VOLUME_RATIO: f64 = 1.5;
const ERRATIC_SWING_PCT: f64 = 2.0;
const GAP_PCT: f64 = 0.5;
const MAX_GAPS: usize = 5;

/// Flags abnormal volume and price behaviour independent of the
/// technical signal. Rules only ever raise risk, never lower it.
pub struct ManipulationDetector;

impl ManipulationDetector {
    /// Assess one symbol from its live quote, 20 days of daily candles,
    /// and a window of 5-minute candles.
    pub fn assess(
        quote: &Quote,
        daily: &[Candle],
        intraday: &[Candle],
    ) -> Result<ManipulationAssessment, EngineError> {
        if daily.len() < MIN_DAILY_BARS {
            return Err(EngineError::InsufficientData(format!(
                "need at least {MIN_DAILY_BARS} daily candles for volume baseline, got {}",
                daily.len()
            )));
        }
        if intraday.len() < MIN_INTRADAY_BARS {
            return Err(EngineError::InsufficientData(format!(
                "need at least {MIN_INTRADAY_BARS} intraday candles for swing analysis, got {}",
                intraday.len()
            )));
        }

        let mut risk = ManipulationRisk::Low;
        let mut evidence = Vec::new();

        // Pass 1: daily volume anomalies
        let window = &daily[daily.len() - MIN_DAILY_BARS..];
        let volumes: Vec<f64> = window.iter().map(|c| c.volume).collect();
        let avg = volumes.iter().sum::<f64>() / volumes.len() as f64;
        let variance =
            volumes.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / volumes.len() as f64;
        let stddev = variance.sqrt();

        let volume_ratio = if avg > 0.0 { quote.volume / avg } else { 0.0 };
        let volume_zscore = if stddev > 0.0 {
            (quote.volume - avg) / stddev
        } else {
            0.0
        };

        if volume_ratio > EXTREME_VOLUME_RATIO {
            evidence.push(format!(
                "EXTREME_VOLUME: volume {volume_ratio:.1}x the 20-day average"
            ));
            risk = ManipulationRisk::High;
        } else if volume_ratio > HIGH_VOLUME_RATIO {
            evidence.push(format!(
                "HIGH_VOLUME: volume {volume_ratio:.1}x the 20-day average"
            ));
            risk = risk.max(ManipulationRisk::Medium);
        }

        let prev_close = daily.last().unwrap().close;
        let price_change_pct = if prev_close > 0.0 {
            (quote.last_price - prev_close) / prev_close * 100.0
        } else {
            0.0
        };
        if price_change_pct.abs() > PRICE_MOVE_PCT && volume_ratio < QUIET_VOLUME_RATIO {
            evidence.push(format!(
                "PRICE_WITHOUT_VOLUME: {price_change_pct:.1}% move on {volume_ratio:.1}x volume"
            ));
            risk = ManipulationRisk::High;
        }

        // Pass 2: intraday price action
        let recent = &intraday[intraday.len() - MIN_INTRADAY_BARS..];
        let mut max_swing_pct: f64 = 0.0;
        for w in recent.windows(2) {
            if w[0].close > 0.0 {
                let swing = (w[1].close - w[0].close).abs() / w[0].close * 100.0;
                max_swing_pct = max_swing_pct.max(swing);
            }
        }
        if max_swing_pct > ERRATIC_SWING_PCT {
            evidence.push(format!(
                "ERRATIC_SWINGS: {max_swing_pct:.1}% single-candle move"
            ));
            risk = risk.max(ManipulationRisk::Medium);
        }

        let gap_count = recent
            .windows(2)
            .filter(|w| {
                w[0].close > 0.0 && (w[1].open - w[0].close).abs() / w[0].close * 100.0 > GAP_PCT
            })
            .count();
        if gap_count > MAX_GAPS {
            evidence.push(format!("FREQUENT_GAPS: {gap_count} gaps in the window"));
            risk = risk.max(ManipulationRisk::Medium);
        }

        let recommendation = match risk {
            ManipulationRisk::High => TradeRecommendation::DoNotTrade,
            ManipulationRisk::Medium => TradeRecommendation::Caution,
            ManipulationRisk::Low => TradeRecommendation::Safe,
        };

        if risk != ManipulationRisk::Low {
            tracing::warn!(
                "Manipulation risk {:?} for {}: {}",
                risk,
                quote.symbol,
                evidence.join("; ")
            );
        }

        Ok(ManipulationAssessment {
            symbol: quote.symbol.clone(),
            risk,
            evidence,
            recommendation,
            volume_ratio,
            volume_zscore,
            price_change_pct,
            max_swing_pct,
            gap_count,
        })
    }
}
