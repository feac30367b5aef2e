use trading_core::{Candle, Quote};

/// Pre-trade liquidity gate: symbols that are too cheap or too thin are
/// filtered out before the full evaluation spends any data calls.
pub fn universe_rejection(
    quote: &Quote,
    daily: &[Candle],
    min_price: f64,
    min_avg_volume: f64,
) -> Option<String> {
    if quote.last_price < min_price {
        return Some(format!(
            "price {:.2} below minimum {:.2}",
            quote.last_price, min_price
        ));
    }
    let window = &daily[daily.len().saturating_sub(20)..];
    if window.is_empty() {
        return Some("no daily volume history".to_string());
    }
    let avg_volume = window.iter().map(|c| c.volume).sum::<f64>() / window.len() as f64;
    if avg_volume < min_avg_volume {
        return Some(format!(
            "20-day average volume {avg_volume:.0} below minimum {min_avg_volume:.0}"
        ));
    }
    None
}
