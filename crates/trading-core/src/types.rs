use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candle data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Live quote with market depth totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub last_price: f64,
    pub volume: f64,
    pub buy_quantity: i64,
    pub sell_quantity: i64,
}

/// Candle interval, named the way the data vendor names them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    Minute1,
    Minute5,
    Minute15,
    Day,
}

impl Interval {
    pub fn vendor_name(&self) -> &'static str {
        match self {
            Interval::Minute1 => "minute",
            Interval::Minute5 => "5minute",
            Interval::Minute15 => "15minute",
            Interval::Day => "day",
        }
    }

    pub fn to_minutes(&self) -> i64 {
        match self {
            Interval::Minute1 => 1,
            Interval::Minute5 => 5,
            Interval::Minute15 => 15,
            Interval::Day => 1440,
        }
    }
}

/// Trade action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Wait,
}

impl SignalAction {
    pub fn is_entry(&self) -> bool {
        matches!(self, SignalAction::Buy | SignalAction::Sell)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendStrength {
    Strong,
    Moderate,
    Weak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketRegime {
    Trending,
    Ranging,
    Volatile,
}

/// Which side of the book the trend allows us to trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradingBias {
    LongOnly,
    ShortOnly,
    Both,
}

/// Oscillator-style label (RSI, Bollinger touch, stochastic)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OscillatorSignal {
    Oversold,
    Overbought,
    Neutral,
}

/// Crossover-style label (MACD vs signal, price vs VWAP)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CrossoverSignal {
    Bullish,
    Bearish,
}

/// Fused technical signal with price targets.
///
/// Invariant: for Buy, stop_loss < entry < target; for Sell reversed.
/// Wait carries no prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalSignal {
    pub symbol: String,
    pub action: SignalAction,
    pub confidence: f64,
    pub entry: Option<f64>,
    pub stop_loss: Option<f64>,
    pub target: Option<f64>,
    pub reasons: Vec<String>,
}

impl TechnicalSignal {
    pub fn wait(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            action: SignalAction::Wait,
            confidence: 0.0,
            entry: None,
            stop_loss: None,
            target: None,
            reasons: vec![reason.into()],
        }
    }
}

/// Manipulation risk, ordered so that `max` only ever raises it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ManipulationRisk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeRecommendation {
    Safe,
    Caution,
    DoNotTrade,
}

/// Output of the manipulation detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManipulationAssessment {
    pub symbol: String,
    pub risk: ManipulationRisk,
    pub evidence: Vec<String>,
    pub recommendation: TradeRecommendation,
    pub volume_ratio: f64,
    pub volume_zscore: f64,
    pub price_change_pct: f64,
    pub max_swing_pct: f64,
    pub gap_count: usize,
}

/// External sentiment input; neutral when the source is unavailable
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SentimentAssessment {
    pub score: f64,
    pub material: bool,
}

impl SentimentAssessment {
    pub fn neutral() -> Self {
        Self {
            score: 0.0,
            material: false,
        }
    }
}

/// Final fused decision for one evaluation cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeDecision {
    pub symbol: String,
    pub action: SignalAction,
    pub confidence: f64,
    pub conflict_notes: Vec<String>,
}

/// Position sizing verdict from the risk engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSizing {
    pub symbol: String,
    pub action: SignalAction,
    pub approved: bool,
    pub quantity: i64,
    pub entry: f64,
    pub stop_loss: f64,
    pub target: Option<f64>,
    pub capital_allocated: f64,
    pub capital_pct: f64,
    pub risk_amount: f64,
    pub risk_pct: f64,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    #[serde(rename = "MARKET")]
    Market,
    #[serde(rename = "LIMIT")]
    Limit,
    #[serde(rename = "SL")]
    StopLossLimit,
    #[serde(rename = "SL-M")]
    StopLossMarket,
}

/// Product type; MIS positions must be squared off the same day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    #[serde(rename = "MIS")]
    Intraday,
    #[serde(rename = "CNC")]
    Delivery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: i64,
    pub order_type: OrderType,
    pub product: ProductType,
    pub price: Option<f64>,
    pub trigger_price: Option<f64>,
    pub tag: Option<String>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: i64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Market,
            product: ProductType::Intraday,
            price: None,
            trigger_price: None,
            tag: None,
        }
    }

    pub fn stop_market(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: i64,
        trigger_price: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::StopLossMarket,
            product: ProductType::Intraday,
            price: None,
            trigger_price: Some(trigger_price),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Broker-side order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Open,
    Complete,
    PartiallyFilled,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: String,
    pub status: OrderStatus,
    pub filled_quantity: i64,
    pub pending_quantity: i64,
    pub average_price: Option<f64>,
}

/// Open position as reported by the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    pub avg_price: f64,
    pub last_price: f64,
    pub pnl: f64,
    pub product: ProductType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarginSummary {
    pub available: f64,
    pub used: f64,
}

/// Single authoritative portfolio snapshot per evaluation cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    pub capital: f64,
    pub available_margin: f64,
    pub deployed_capital: f64,
    pub positions: Vec<Position>,
    pub exposure_pct: f64,
}

impl PortfolioState {
    pub fn new(capital: f64) -> Self {
        Self {
            capital,
            available_margin: capital,
            deployed_capital: 0.0,
            positions: Vec::new(),
            exposure_pct: 0.0,
        }
    }
}
