use serde::{Deserialize, Serialize};
use trading_core::{Candle, EngineError};

use crate::levels::{key_levels, KeyLevels};

pub const MIN_PATTERN_BARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternKind {
    Hammer,
    InvertedHammer,
    BullishEngulfing,
    BearishEngulfing,
    Doji,
    MorningStar,
    EveningStar,
    ThreeWhiteSoldiers,
    ThreeBlackCrows,
}

impl PatternKind {
    pub fn name(&self) -> &'static str {
        match self {
            PatternKind::Hammer => "Hammer",
            PatternKind::InvertedHammer => "Inverted Hammer",
            PatternKind::BullishEngulfing => "Bullish Engulfing",
            PatternKind::BearishEngulfing => "Bearish Engulfing",
            PatternKind::Doji => "Doji",
            PatternKind::MorningStar => "Morning Star",
            PatternKind::EveningStar => "Evening Star",
            PatternKind::ThreeWhiteSoldiers => "Three White Soldiers",
            PatternKind::ThreeBlackCrows => "Three Black Crows",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub kind: PatternKind,
    pub bullish: bool,
    /// 0.0 to 1.0
    pub strength: f64,
}

/// Candlestick matches on the latest bar plus the key levels derived
/// from daily history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternScan {
    pub matches: Vec<PatternMatch>,
    pub levels: KeyLevels,
}

impl PatternScan {
    pub fn has_bullish(&self) -> bool {
        self.matches.iter().any(|m| m.bullish)
    }

    pub fn has_bearish(&self) -> bool {
        self.matches.iter().any(|m| !m.bullish && m.kind != PatternKind::Doji)
    }
}

fn body(c: &Candle) -> f64 {
    (c.close - c.open).abs()
}

fn range(c: &Candle) -> f64 {
    c.high - c.low
}

fn lower_shadow(c: &Candle) -> f64 {
    c.open.min(c.close) - c.low
}

fn upper_shadow(c: &Candle) -> f64 {
    c.high - c.open.max(c.close)
}

fn is_doji(c: &Candle) -> bool {
    range(c) > 0.0 && body(c) / range(c) < 0.1
}

fn hammer(c: &Candle) -> Option<PatternMatch> {
    if range(c) == 0.0 {
        return None;
    }
    // Small body, long lower shadow, little on top
    if body(c) / range(c) < 0.3
        && lower_shadow(c) > 2.0 * body(c)
        && upper_shadow(c) < body(c) * 0.5
    {
        let strength = (lower_shadow(c) / body(c).max(f64::EPSILON)).min(5.0) / 5.0;
        return Some(PatternMatch {
            kind: PatternKind::Hammer,
            bullish: true,
            strength,
        });
    }
    None
}

fn inverted_hammer(c: &Candle) -> Option<PatternMatch> {
    if range(c) == 0.0 {
        return None;
    }
    if body(c) / range(c) < 0.3
        && upper_shadow(c) > 2.0 * body(c)
        && lower_shadow(c) < body(c) * 0.5
    {
        let strength = (upper_shadow(c) / body(c).max(f64::EPSILON)).min(5.0) / 5.0;
        return Some(PatternMatch {
            kind: PatternKind::InvertedHammer,
            bullish: true,
            strength,
        });
    }
    None
}

fn engulfing(prev: &Candle, curr: &Candle) -> Option<PatternMatch> {
    let prev_up = prev.close > prev.open;
    let curr_up = curr.close > curr.open;

    if !prev_up && curr_up && curr.open <= prev.close && curr.close >= prev.open {
        let ratio = (curr.close - curr.open) / (prev.open - prev.close).max(f64::EPSILON);
        return Some(PatternMatch {
            kind: PatternKind::BullishEngulfing,
            bullish: true,
            strength: ratio.min(2.0) / 2.0,
        });
    }
    if prev_up && !curr_up && curr.open >= prev.close && curr.close <= prev.open {
        let ratio = (curr.open - curr.close) / (prev.close - prev.open).max(f64::EPSILON);
        return Some(PatternMatch {
            kind: PatternKind::BearishEngulfing,
            bullish: false,
            strength: ratio.min(2.0) / 2.0,
        });
    }
    None
}

fn morning_star(first: &Candle, star: &Candle, third: &Candle) -> Option<PatternMatch> {
    let first_down = first.close < first.open;
    let third_up = third.close > third.open;
    if !first_down || !third_up || range(first) == 0.0 {
        return None;
    }
    let midpoint = (first.open + first.close) / 2.0;
    if body(star) < body(first) * 0.3 && third.close > midpoint {
        return Some(PatternMatch {
            kind: PatternKind::MorningStar,
            bullish: true,
            strength: 0.8,
        });
    }
    None
}

fn evening_star(first: &Candle, star: &Candle, third: &Candle) -> Option<PatternMatch> {
    let first_up = first.close > first.open;
    let third_down = third.close < third.open;
    if !first_up || !third_down || range(first) == 0.0 {
        return None;
    }
    let midpoint = (first.open + first.close) / 2.0;
    if body(star) < body(first) * 0.3 && third.close < midpoint {
        return Some(PatternMatch {
            kind: PatternKind::EveningStar,
            bullish: false,
            strength: 0.8,
        });
    }
    None
}

fn three_soldiers(last3: &[Candle]) -> Option<PatternMatch> {
    if !last3.iter().all(|c| c.close > c.open) {
        return None;
    }
    let closes_rising = last3[1].close > last3[0].close && last3[2].close > last3[1].close;
    let opens_inside = last3[1].open > last3[0].open
        && last3[1].open < last3[0].close
        && last3[2].open > last3[1].open
        && last3[2].open < last3[1].close;
    if closes_rising && opens_inside {
        return Some(PatternMatch {
            kind: PatternKind::ThreeWhiteSoldiers,
            bullish: true,
            strength: 0.8,
        });
    }
    None
}

fn three_crows(last3: &[Candle]) -> Option<PatternMatch> {
    if !last3.iter().all(|c| c.close < c.open) {
        return None;
    }
    let closes_falling = last3[1].close < last3[0].close && last3[2].close < last3[1].close;
    let opens_inside = last3[1].open < last3[0].open
        && last3[1].open > last3[0].close
        && last3[2].open < last3[1].open
        && last3[2].open > last3[1].close;
    if closes_falling && opens_inside {
        return Some(PatternMatch {
            kind: PatternKind::ThreeBlackCrows,
            bullish: false,
            strength: 0.8,
        });
    }
    None
}

/// Detect the reversal/continuation catalog on the latest bar of a short
/// intraday window.
pub fn detect_patterns(candles: &[Candle]) -> Result<Vec<PatternMatch>, EngineError> {
    if candles.len() < MIN_PATTERN_BARS {
        return Err(EngineError::InsufficientData(format!(
            "need at least {MIN_PATTERN_BARS} candles for pattern detection, got {}",
            candles.len()
        )));
    }

    let mut matches = Vec::new();
    let last = candles.last().unwrap();

    if is_doji(last) {
        matches.push(PatternMatch {
            kind: PatternKind::Doji,
            bullish: false,
            strength: 0.5,
        });
    }
    if let Some(m) = hammer(last) {
        matches.push(m);
    }
    if let Some(m) = inverted_hammer(last) {
        matches.push(m);
    }

    let n = candles.len();
    if let Some(m) = engulfing(&candles[n - 2], &candles[n - 1]) {
        matches.push(m);
    }
    if let Some(m) = morning_star(&candles[n - 3], &candles[n - 2], &candles[n - 1]) {
        matches.push(m);
    }
    if let Some(m) = evening_star(&candles[n - 3], &candles[n - 2], &candles[n - 1]) {
        matches.push(m);
    }
    if let Some(m) = three_soldiers(&candles[n - 3..]) {
        matches.push(m);
    }
    if let Some(m) = three_crows(&candles[n - 3..]) {
        matches.push(m);
    }

    Ok(matches)
}

/// Full pattern pass: candlestick shapes on the intraday window plus key
/// levels from daily history.
pub fn scan(intraday: &[Candle], daily: &[Candle]) -> Result<PatternScan, EngineError> {
    let matches = detect_patterns(intraday)?;
    let levels = key_levels(daily)?;
    Ok(PatternScan { matches, levels })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 10_000.0,
        }
    }

    fn padded(mut tail: Vec<Candle>) -> Vec<Candle> {
        let mut out: Vec<Candle> = (0..10).map(|_| bar(100.0, 101.0, 99.0, 100.5)).collect();
        out.append(&mut tail);
        out
    }

    #[test]
    fn rejects_short_window() {
        let candles = vec![bar(100.0, 101.0, 99.0, 100.0); 5];
        assert!(matches!(
            detect_patterns(&candles),
            Err(EngineError::InsufficientData(_))
        ));
    }

    #[test]
    fn detects_hammer() {
        let candles = padded(vec![bar(100.0, 100.25, 96.0, 100.2)]);
        let matches = detect_patterns(&candles).unwrap();
        assert!(matches.iter().any(|m| m.kind == PatternKind::Hammer && m.bullish));
    }

    #[test]
    fn detects_doji() {
        let candles = padded(vec![bar(100.0, 102.0, 98.0, 100.05)]);
        let matches = detect_patterns(&candles).unwrap();
        assert!(matches.iter().any(|m| m.kind == PatternKind::Doji));
    }

    #[test]
    fn detects_bullish_engulfing() {
        let candles = padded(vec![bar(101.0, 101.5, 99.5, 100.0), bar(99.8, 102.0, 99.5, 101.5)]);
        let matches = detect_patterns(&candles).unwrap();
        assert!(matches
            .iter()
            .any(|m| m.kind == PatternKind::BullishEngulfing && m.bullish));
    }

    #[test]
    fn detects_bearish_engulfing() {
        let candles = padded(vec![bar(100.0, 101.5, 99.5, 101.0), bar(101.2, 101.5, 99.0, 99.5)]);
        let matches = detect_patterns(&candles).unwrap();
        assert!(matches
            .iter()
            .any(|m| m.kind == PatternKind::BearishEngulfing && !m.bullish));
    }

    #[test]
    fn detects_morning_star() {
        let candles = padded(vec![
            bar(104.0, 104.5, 99.5, 100.0), // big red
            bar(99.8, 100.3, 99.4, 100.0),  // small star
            bar(100.2, 104.0, 100.0, 103.5), // big green, closes above midpoint
        ]);
        let matches = detect_patterns(&candles).unwrap();
        assert!(matches.iter().any(|m| m.kind == PatternKind::MorningStar));
    }

    #[test]
    fn detects_three_white_soldiers() {
        let candles = padded(vec![
            bar(100.0, 102.2, 99.8, 102.0),
            bar(101.0, 103.2, 100.8, 103.0),
            bar(102.0, 104.2, 101.8, 104.0),
        ]);
        let matches = detect_patterns(&candles).unwrap();
        assert!(matches
            .iter()
            .any(|m| m.kind == PatternKind::ThreeWhiteSoldiers && m.bullish));
    }

    #[test]
    fn quiet_bar_matches_nothing() {
        let candles = padded(vec![bar(100.0, 101.2, 99.6, 100.9)]);
        let matches = detect_patterns(&candles).unwrap();
        assert!(matches.is_empty());
    }
}
