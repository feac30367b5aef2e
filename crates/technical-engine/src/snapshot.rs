use serde::{Deserialize, Serialize};
use trading_core::{Candle, CrossoverSignal, EngineError, OscillatorSignal};

use crate::indicators::{atr, bollinger, ema, macd, rsi, stochastic, vwap};

/// Minimum candles before the oscillator set can be computed.
pub const MIN_SNAPSHOT_BARS: usize = 50;
/// Long EMA needs its own, larger window; below it the field stays `None`.
pub const LONG_EMA_BARS: usize = 200;

/// Latest indicator values and their derived labels for one symbol.
/// Recomputed from scratch on every evaluation, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub current_price: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub atr: f64,
    pub vwap: f64,
    pub ema_20: f64,
    pub ema_50: f64,
    pub ema_200: Option<f64>,

    pub rsi_label: OscillatorSignal,
    pub bollinger_label: OscillatorSignal,
    pub stoch_label: OscillatorSignal,
    pub macd_crossover: CrossoverSignal,
    pub vwap_bias: CrossoverSignal,
}

impl IndicatorSnapshot {
    /// How many of {RSI, MACD, Bollinger, VWAP} lean bullish.
    pub fn bullish_label_count(&self) -> usize {
        [
            self.rsi_label == OscillatorSignal::Oversold,
            self.macd_crossover == CrossoverSignal::Bullish,
            self.bollinger_label == OscillatorSignal::Oversold,
            self.vwap_bias == CrossoverSignal::Bullish,
        ]
        .iter()
        .filter(|&&b| b)
        .count()
    }

    /// How many of the same four lean bearish.
    pub fn bearish_label_count(&self) -> usize {
        [
            self.rsi_label == OscillatorSignal::Overbought,
            self.macd_crossover == CrossoverSignal::Bearish,
            self.bollinger_label == OscillatorSignal::Overbought,
            self.vwap_bias == CrossoverSignal::Bearish,
        ]
        .iter()
        .filter(|&&b| b)
        .count()
    }

    /// Composite bullish score: agreeing labels out of 4.
    pub fn bullish_score(&self) -> f64 {
        self.bullish_label_count() as f64 / 4.0
    }

    pub fn bearish_score(&self) -> f64 {
        self.bearish_label_count() as f64 / 4.0
    }
}

/// Compute the full oscillator snapshot from a candle series.
pub fn compute_snapshot(candles: &[Candle]) -> Result<IndicatorSnapshot, EngineError> {
    if candles.len() < MIN_SNAPSHOT_BARS {
        return Err(EngineError::InsufficientData(format!(
            "need at least {MIN_SNAPSHOT_BARS} candles for indicators, got {}",
            candles.len()
        )));
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let current_price = *closes.last().unwrap();

    let rsi_series = rsi(&closes, 14);
    let macd_series = macd(&closes, 12, 26, 9);
    let bands = bollinger(&closes, 20, 2.0);
    let stoch = stochastic(candles, 14, 3);
    let atr_series = atr(candles, 14);
    let vwap_series = vwap(candles);
    let ema_20_series = ema(&closes, 20);
    let ema_50_series = ema(&closes, 50);
    let ema_200 = if closes.len() >= LONG_EMA_BARS {
        ema(&closes, 200).last().copied()
    } else {
        None
    };

    let last = |series: &[f64], name: &str| -> Result<f64, EngineError> {
        series
            .last()
            .copied()
            .ok_or_else(|| EngineError::InsufficientData(format!("{name} produced no values")))
    };

    let rsi_value = last(&rsi_series, "RSI")?;
    let macd_value = last(&macd_series.line, "MACD")?;
    let macd_signal = last(&macd_series.signal, "MACD signal")?;
    let macd_histogram = last(&macd_series.histogram, "MACD histogram")?;
    let bb_upper = last(&bands.upper, "Bollinger upper")?;
    let bb_middle = last(&bands.middle, "Bollinger middle")?;
    let bb_lower = last(&bands.lower, "Bollinger lower")?;
    let stoch_k = last(&stoch.k, "stochastic %K")?;
    let stoch_d = last(&stoch.d, "stochastic %D")?;
    let atr_value = last(&atr_series, "ATR")?;
    let vwap_value = last(&vwap_series, "VWAP")?;
    let ema_20 = last(&ema_20_series, "EMA20")?;
    let ema_50 = last(&ema_50_series, "EMA50")?;

    let rsi_label = if rsi_value < 30.0 {
        OscillatorSignal::Oversold
    } else if rsi_value > 70.0 {
        OscillatorSignal::Overbought
    } else {
        OscillatorSignal::Neutral
    };

    let bollinger_label = if current_price <= bb_lower {
        OscillatorSignal::Oversold
    } else if current_price >= bb_upper {
        OscillatorSignal::Overbought
    } else {
        OscillatorSignal::Neutral
    };

    let stoch_label = if stoch_k < 20.0 {
        OscillatorSignal::Oversold
    } else if stoch_k > 80.0 {
        OscillatorSignal::Overbought
    } else {
        OscillatorSignal::Neutral
    };

    let macd_crossover = if macd_value > macd_signal {
        CrossoverSignal::Bullish
    } else {
        CrossoverSignal::Bearish
    };

    let vwap_bias = if current_price > vwap_value {
        CrossoverSignal::Bullish
    } else {
        CrossoverSignal::Bearish
    };

    Ok(IndicatorSnapshot {
        current_price,
        rsi: rsi_value,
        macd: macd_value,
        macd_signal,
        macd_histogram,
        bb_upper,
        bb_middle,
        bb_lower,
        stoch_k,
        stoch_d,
        atr: atr_value,
        vwap: vwap_value,
        ema_20,
        ema_50,
        ema_200,
        rsi_label,
        bollinger_label,
        stoch_label,
        macd_crossover,
        vwap_bias,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: Utc.with_ymd_and_hms(2025, 6, 2, 9, 15, 0).unwrap()
                    + chrono::Duration::minutes(5 * i as i64),
                open: close - 0.2,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 50_000.0,
            })
            .collect()
    }

    #[test]
    fn rejects_short_series() {
        let candles = candles_from_closes(&[100.0; 30]);
        let err = compute_snapshot(&candles).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData(_)));
    }

    #[test]
    fn long_ema_absent_below_200_bars() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64) * 0.1).collect();
        let snap = compute_snapshot(&candles_from_closes(&closes)).unwrap();
        assert!(snap.ema_200.is_none());
    }

    #[test]
    fn steady_uptrend_reads_bullish() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let snap = compute_snapshot(&candles_from_closes(&closes)).unwrap();

        assert_eq!(snap.macd_crossover, CrossoverSignal::Bullish);
        assert_eq!(snap.vwap_bias, CrossoverSignal::Bullish);
        // Relentless gains push RSI past overbought
        assert_eq!(snap.rsi_label, OscillatorSignal::Overbought);
        assert!(snap.rsi > 70.0);
    }

    #[test]
    fn composite_scores_are_complementary_subsets() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i % 7) as f64 * 0.3).collect();
        let snap = compute_snapshot(&candles_from_closes(&closes)).unwrap();

        assert!(snap.bullish_score() >= 0.0 && snap.bullish_score() <= 1.0);
        assert!(snap.bullish_label_count() + snap.bearish_label_count() <= 4);
    }

    #[test]
    fn oversold_labels_on_collapse() {
        let mut closes: Vec<f64> = vec![200.0; 40];
        closes.extend((0..20).map(|i| 200.0 - 4.0 * i as f64));
        let snap = compute_snapshot(&candles_from_closes(&closes)).unwrap();

        assert_eq!(snap.rsi_label, OscillatorSignal::Oversold);
        assert_eq!(snap.macd_crossover, CrossoverSignal::Bearish);
        assert_eq!(snap.vwap_bias, CrossoverSignal::Bearish);
        assert!(snap.bearish_label_count() >= 2);
    }
}
