use trading_core::Candle;

/// Simple moving average. Output is end-aligned: the first element
/// corresponds to `data[period - 1]`.
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }
    data.windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect()
}

/// Exponential moving average, seeded with the SMA of the first `period`
/// values. Output is end-aligned like `sma`.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = data[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(data.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for &value in &data[period..] {
        prev = (value - prev) * alpha + prev;
        out.push(prev);
    }
    out
}

/// RSI with Wilder smoothing. First value is produced once `period + 1`
/// inputs are available.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![];
    }

    let changes: Vec<f64> = data.windows(2).map(|w| w[1] - w[0]).collect();
    let mut avg_gain = changes[..period].iter().filter(|&&c| c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss =
        changes[..period].iter().filter(|&&c| c < 0.0).sum::<f64>().abs() / period as f64;

    let to_rsi = |gain: f64, loss: f64| {
        if loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        }
    };

    let mut out = Vec::with_capacity(changes.len() - period + 1);
    out.push(to_rsi(avg_gain, avg_loss));
    for &change in &changes[period..] {
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        out.push(to_rsi(avg_gain, avg_loss));
    }
    out
}

pub struct MacdSeries {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(data: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdSeries {
    if fast == 0 || slow <= fast || signal_period == 0 || data.len() < slow {
        return MacdSeries {
            line: vec![],
            signal: vec![],
            histogram: vec![],
        };
    }

    let ema_fast = ema(data, fast);
    let ema_slow = ema(data, slow);

    // Both series are end-aligned; trim the fast one to the slow one's length
    let skip = ema_fast.len() - ema_slow.len();
    let line: Vec<f64> = ema_fast[skip..]
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| f - s)
        .collect();

    let signal = ema(&line, signal_period);
    let hist_skip = line.len().saturating_sub(signal.len());
    let histogram: Vec<f64> = line[hist_skip..]
        .iter()
        .zip(&signal)
        .map(|(m, s)| m - s)
        .collect();

    MacdSeries {
        line,
        signal,
        histogram,
    }
}

pub struct BandSeries {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger(data: &[f64], period: usize, width: f64) -> BandSeries {
    if period == 0 || data.len() < period {
        return BandSeries {
            upper: vec![],
            middle: vec![],
            lower: vec![],
        };
    }

    let middle = sma(data, period);
    let mut upper = Vec::with_capacity(middle.len());
    let mut lower = Vec::with_capacity(middle.len());

    for (i, window) in data.windows(period).enumerate() {
        let mean = middle[i];
        let variance =
            window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let sigma = variance.sqrt();
        upper.push(mean + width * sigma);
        lower.push(mean - width * sigma);
    }

    BandSeries {
        upper,
        middle,
        lower,
    }
}

pub struct StochSeries {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

pub fn stochastic(candles: &[Candle], k_period: usize, d_period: usize) -> StochSeries {
    if k_period == 0 || candles.len() < k_period {
        return StochSeries { k: vec![], d: vec![] };
    }

    let k: Vec<f64> = candles
        .windows(k_period)
        .map(|w| {
            let highest = w.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
            let lowest = w.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
            let close = w.last().unwrap().close;
            if highest == lowest {
                50.0
            } else {
                100.0 * (close - lowest) / (highest - lowest)
            }
        })
        .collect();

    let d = sma(&k, d_period);
    StochSeries { k, d }
}

fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|w| {
            let hl = w[1].high - w[1].low;
            let hc = (w[1].high - w[0].close).abs();
            let lc = (w[1].low - w[0].close).abs();
            hl.max(hc).max(lc)
        })
        .collect()
}

/// ATR with Wilder smoothing; needs `period + 1` candles.
pub fn atr(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return vec![];
    }

    let trs = true_ranges(candles);
    let mut value = trs[..period].iter().sum::<f64>() / period as f64;
    let mut out = Vec::with_capacity(trs.len() - period + 1);
    out.push(value);
    for &tr in &trs[period..] {
        value = (value * (period - 1) as f64 + tr) / period as f64;
        out.push(value);
    }
    out
}

/// Cumulative volume-weighted average price over the whole series.
pub fn vwap(candles: &[Candle]) -> Vec<f64> {
    let mut cum_tpv = 0.0;
    let mut cum_vol = 0.0;
    candles
        .iter()
        .map(|c| {
            let typical = (c.high + c.low + c.close) / 3.0;
            cum_tpv += typical * c.volume;
            cum_vol += c.volume;
            if cum_vol > 0.0 {
                cum_tpv / cum_vol
            } else {
                typical
            }
        })
        .collect()
}

/// Mean true range of the trailing `recent` candles relative to the mean
/// over the whole series. Values above 1.0 mean ranges are expanding.
pub fn true_range_ratio(candles: &[Candle], recent: usize) -> f64 {
    let trs = true_ranges(candles);
    if recent == 0 || trs.len() < recent {
        return 1.0;
    }
    let full = trs.iter().sum::<f64>() / trs.len() as f64;
    if full == 0.0 {
        return 1.0;
    }
    let tail = &trs[trs.len() - recent..];
    (tail.iter().sum::<f64>() / recent as f64) / full
}

pub struct DmiSeries {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

/// ADX with Wilder smoothing; needs `2 * period + 1` candles before the
/// first ADX value appears.
pub fn adx(candles: &[Candle], period: usize) -> DmiSeries {
    if period == 0 || candles.len() < 2 * period + 1 {
        return DmiSeries {
            adx: vec![],
            plus_di: vec![],
            minus_di: vec![],
        };
    }

    let mut plus_dm = Vec::with_capacity(candles.len() - 1);
    let mut minus_dm = Vec::with_capacity(candles.len() - 1);
    for w in candles.windows(2) {
        let up = w[1].high - w[0].high;
        let down = w[0].low - w[1].low;
        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });
    }
    let trs = true_ranges(candles);

    let mut sm_plus = plus_dm[..period].iter().sum::<f64>();
    let mut sm_minus = minus_dm[..period].iter().sum::<f64>();
    let mut sm_tr = trs[..period].iter().sum::<f64>();

    let mut plus_di = Vec::new();
    let mut minus_di = Vec::new();
    let mut dx = Vec::new();

    for i in period..plus_dm.len() {
        sm_plus = sm_plus - sm_plus / period as f64 + plus_dm[i];
        sm_minus = sm_minus - sm_minus / period as f64 + minus_dm[i];
        sm_tr = sm_tr - sm_tr / period as f64 + trs[i];

        let pdi = if sm_tr > 0.0 { 100.0 * sm_plus / sm_tr } else { 0.0 };
        let mdi = if sm_tr > 0.0 { 100.0 * sm_minus / sm_tr } else { 0.0 };
        plus_di.push(pdi);
        minus_di.push(mdi);

        let di_sum = pdi + mdi;
        dx.push(if di_sum > 0.0 {
            100.0 * (pdi - mdi).abs() / di_sum
        } else {
            0.0
        });
    }

    if dx.len() < period {
        return DmiSeries {
            adx: vec![],
            plus_di,
            minus_di,
        };
    }

    let mut value = dx[..period].iter().sum::<f64>() / period as f64;
    let mut adx_out = Vec::with_capacity(dx.len() - period + 1);
    adx_out.push(value);
    for &d in &dx[period..] {
        value = (value * (period - 1) as f64 + d) / period as f64;
        adx_out.push(value);
    }

    DmiSeries {
        adx: adx_out,
        plus_di,
        minus_di,
    }
}
