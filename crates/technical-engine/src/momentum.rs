use serde::{Deserialize, Serialize};
use trading_core::{Candle, EngineError, Quote};

pub const MIN_VOLUME_BARS: usize = 10;
pub const MIN_VELOCITY_BARS: usize = 10;
const VOLUME_LOOKBACK: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolumeQuality {
    High,
    AboveAverage,
    Normal,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryAdvice {
    EnterNow,
    WaitPullback,
    DontEnter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VelocityTrend {
    Building,
    Fading,
    Steady,
}

/// Volume and velocity read for entry confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumReading {
    pub volume_ratio: f64,
    pub quality: VolumeQuality,
    pub advice: EntryAdvice,
    pub velocity: VelocityTrend,
}

impl MomentumReading {
    /// The entry gate: only ENTER_NOW counts as confirmation.
    pub fn confirmed(&self) -> bool {
        self.advice == EntryAdvice::EnterNow
    }
}

fn quality_for_ratio(ratio: f64) -> (VolumeQuality, EntryAdvice) {
    if ratio > 2.0 {
        (VolumeQuality::High, EntryAdvice::EnterNow)
    } else if ratio > 1.5 {
        (VolumeQuality::AboveAverage, EntryAdvice::EnterNow)
    } else if ratio > 1.0 {
        (VolumeQuality::Normal, EntryAdvice::WaitPullback)
    } else {
        (VolumeQuality::Low, EntryAdvice::DontEnter)
    }
}

/// Today's volume against the 20-day average.
pub fn volume_ratio(current_volume: f64, daily: &[Candle]) -> Result<f64, EngineError> {
    if daily.len() < MIN_VOLUME_BARS {
        return Err(EngineError::InsufficientData(format!(
            "need at least {MIN_VOLUME_BARS} daily candles for volume history, got {}",
            daily.len()
        )));
    }
    let window = &daily[daily.len().saturating_sub(VOLUME_LOOKBACK)..];
    let avg = window.iter().map(|c| c.volume).sum::<f64>() / window.len() as f64;
    if avg <= 0.0 {
        return Ok(0.0);
    }
    Ok(current_volume / avg)
}

/// Candle-range velocity on the shortest timeframe: second half of the
/// window vs the first.
pub fn price_velocity(candles: &[Candle]) -> Result<VelocityTrend, EngineError> {
    if candles.len() < MIN_VELOCITY_BARS {
        return Err(EngineError::InsufficientData(format!(
            "need at least {MIN_VELOCITY_BARS} candles for velocity, got {}",
            candles.len()
        )));
    }

    let sizes: Vec<f64> = candles.iter().map(|c| c.high - c.low).collect();
    let mid = sizes.len() / 2;
    let first = sizes[..mid].iter().sum::<f64>() / mid as f64;
    let second = sizes[mid..].iter().sum::<f64>() / (sizes.len() - mid) as f64;

    Ok(if second > first * 1.2 {
        VelocityTrend::Building
    } else if second < first * 0.8 {
        VelocityTrend::Fading
    } else {
        VelocityTrend::Steady
    })
}

/// Full momentum validation from the live quote, daily volume history,
/// and the shortest-timeframe candle window.
pub fn validate_momentum(
    quote: &Quote,
    daily: &[Candle],
    fast_candles: &[Candle],
) -> Result<MomentumReading, EngineError> {
    let ratio = volume_ratio(quote.volume, daily)?;
    let (quality, advice) = quality_for_ratio(ratio);
    let velocity = price_velocity(fast_candles)?;

    Ok(MomentumReading {
        volume_ratio: ratio,
        quality,
        advice,
        velocity,
    })
}
