use serde::{Deserialize, Serialize};
use trading_core::{Candle, EngineError};

pub const MIN_LEVEL_BARS: usize = 20;

/// Round-number spacing for psychological levels.
pub const ROUND_LEVEL_STEP: f64 = 50.0;

/// Distance (as a fraction of price) under which a level counts as "key".
pub const KEY_LEVEL_PCT: f64 = 0.01;

/// Support/resistance map around the current price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyLevels {
    pub current_price: f64,
    /// Up to three nearest supports, nearest first
    pub supports: Vec<f64>,
    /// Up to three nearest resistances, nearest first
    pub resistances: Vec<f64>,
    pub nearest_support: Option<f64>,
    pub nearest_resistance: Option<f64>,
    /// True when price sits within `KEY_LEVEL_PCT` of the nearest level
    pub at_key_level: bool,
}

/// Local lows with one confirming bar on each side.
fn swing_lows(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(3)
        .filter(|w| w[1].low < w[0].low && w[1].low < w[2].low)
        .map(|w| w[1].low)
        .collect()
}

fn swing_highs(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(3)
        .filter(|w| w[1].high > w[0].high && w[1].high > w[2].high)
        .map(|w| w[1].high)
        .collect()
}

/// Round-number levels at `ROUND_LEVEL_STEP` multiples around a price.
fn round_levels(price: f64) -> Vec<f64> {
    let base = (price / ROUND_LEVEL_STEP).floor() * ROUND_LEVEL_STEP;
    (-3..=3)
        .map(|i| base + i as f64 * ROUND_LEVEL_STEP)
        .filter(|&level| level > 0.0)
        .collect()
}

/// Compute support/resistance from daily history: the three nearest swing
/// lows below price unioned with round-number levels, and the mirror
/// image above.
pub fn key_levels(daily: &[Candle]) -> Result<KeyLevels, EngineError> {
    if daily.len() < MIN_LEVEL_BARS {
        return Err(EngineError::InsufficientData(format!(
            "need at least {MIN_LEVEL_BARS} daily candles for key levels, got {}",
            daily.len()
        )));
    }

    let current_price = daily.last().unwrap().close;

    let mut supports: Vec<f64> = swing_lows(daily)
        .into_iter()
        .chain(round_levels(current_price))
        .filter(|&l| l < current_price)
        .collect();
    // Nearest first = descending below price
    supports.sort_by(|a, b| b.partial_cmp(a).unwrap());
    supports.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);
    supports.truncate(3);

    let mut resistances: Vec<f64> = swing_highs(daily)
        .into_iter()
        .chain(round_levels(current_price))
        .filter(|&l| l > current_price)
        .collect();
    resistances.sort_by(|a, b| a.partial_cmp(b).unwrap());
    resistances.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);
    resistances.truncate(3);

    let nearest_support = supports.first().copied();
    let nearest_resistance = resistances.first().copied();

    let distance = |level: Option<f64>| {
        level
            .map(|l| (current_price - l).abs() / current_price)
            .unwrap_or(f64::INFINITY)
    };
    let at_key_level = distance(nearest_support) < KEY_LEVEL_PCT
        || distance(nearest_resistance) < KEY_LEVEL_PCT;

    Ok(KeyLevels {
        current_price,
        supports,
        resistances,
        nearest_support,
        nearest_resistance,
        at_key_level,
    })
}
