use serde::{Deserialize, Serialize};
use trading_core::{Candle, EngineError, MarketRegime, TradingBias, TrendDirection, TrendStrength};

use crate::indicators::{adx, ema, true_range_ratio};

pub const MIN_TREND_BARS: usize = 50;

/// Higher-timeframe trend read: direction from EMA stacking, strength
/// from ADX, regime from strength plus range dispersion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendOutlook {
    pub current_price: f64,
    pub ema_20: f64,
    pub ema_50: f64,
    pub adx: f64,
    pub direction: TrendDirection,
    pub strength: TrendStrength,
    pub regime: MarketRegime,
    pub bias: TradingBias,
}

pub fn classify_trend(candles: &[Candle]) -> Result<TrendOutlook, EngineError> {
    if candles.len() < MIN_TREND_BARS {
        return Err(EngineError::InsufficientData(format!(
            "need at least {MIN_TREND_BARS} candles for trend classification, got {}",
            candles.len()
        )));
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let current_price = *closes.last().unwrap();

    let ema_20 = *ema(&closes, 20).last().unwrap();
    let ema_50 = *ema(&closes, 50).last().unwrap();

    let dmi = adx(candles, 14);
    let adx_value = dmi.adx.last().copied().unwrap_or(0.0);

    let direction = if current_price > ema_20 && ema_20 > ema_50 {
        TrendDirection::Bullish
    } else if current_price < ema_20 && ema_20 < ema_50 {
        TrendDirection::Bearish
    } else {
        TrendDirection::Neutral
    };

    let strength = if adx_value > 25.0 {
        TrendStrength::Strong
    } else if adx_value > 20.0 {
        TrendStrength::Moderate
    } else {
        TrendStrength::Weak
    };

    // Range expansion trumps the ADX read: wide recent swings relative to
    // the window mean mark the regime as volatile regardless of direction.
    let dispersion = true_range_ratio(candles, 10);
    let regime = if dispersion > 1.5 {
        MarketRegime::Volatile
    } else if strength == TrendStrength::Strong && direction != TrendDirection::Neutral {
        MarketRegime::Trending
    } else {
        MarketRegime::Ranging
    };

    let bias = match direction {
        TrendDirection::Bullish => TradingBias::LongOnly,
        TrendDirection::Bearish => TradingBias::ShortOnly,
        TrendDirection::Neutral => TradingBias::Both,
    };

    Ok(TrendOutlook {
        current_price,
        ema_20,
        ema_50,
        adx: adx_value,
        direction,
        strength,
        regime,
        bias,
    })
}
