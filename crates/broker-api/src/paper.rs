use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use trading_core::{
    Candle, EngineError, Interval, MarginSummary, MarketDataSource, OrderRequest, OrderSide,
    OrderSnapshot, OrderStatus, OrderType, Position, Quote,
};

use crate::BrokerClient;

// ---------------------------------------------------------------------------
// Paper market data: candles and quotes served from memory
// ---------------------------------------------------------------------------

/// In-memory candle/quote store. Series are loaded from CSV files or
/// inserted directly by tests; quotes are synthesized from the latest
/// candle unless overridden.
pub struct PaperMarketData {
    series: DashMap<String, Vec<Candle>>,
    quotes: DashMap<String, Quote>,
}

fn series_key(symbol: &str, interval: Interval) -> String {
    format!("{}:{}", symbol, interval.vendor_name())
}

impl PaperMarketData {
    pub fn new() -> Self {
        Self {
            series: DashMap::new(),
            quotes: DashMap::new(),
        }
    }

    /// Load every `SYMBOL_interval.csv` file in a directory. Rows are
    /// `timestamp,open,high,low,close,volume` with RFC 3339 timestamps.
    pub fn from_csv_dir(dir: impl AsRef<Path>) -> Result<Self, EngineError> {
        let store = Self::new();
        let entries = std::fs::read_dir(dir.as_ref())
            .map_err(|e| EngineError::InvalidData(format!("candle dir: {e}")))?;

        for entry in entries {
            let entry = entry.map_err(|e| EngineError::InvalidData(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|x| x.to_str()) != Some("csv") {
                continue;
            }
            let stem = match path.file_stem().and_then(|s| s.to_str()) {
                Some(s) => s.to_string(),
                None => continue,
            };
            let (symbol, interval) = match stem.rsplit_once('_') {
                Some((sym, iv)) => (sym.to_string(), iv.to_string()),
                None => continue,
            };
            let candles = read_candle_csv(&path)?;
            tracing::debug!(
                "Loaded {} {} candles for {} from {:?}",
                candles.len(),
                interval,
                symbol,
                path
            );
            store.series.insert(format!("{symbol}:{interval}"), candles);
        }
        Ok(store)
    }

    pub fn insert_series(&self, symbol: &str, interval: Interval, candles: Vec<Candle>) {
        self.series.insert(series_key(symbol, interval), candles);
    }

    pub fn set_quote(&self, quote: Quote) {
        self.quotes.insert(quote.symbol.clone(), quote);
    }

    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        if let Some(q) = self.quotes.get(symbol) {
            return Some(q.last_price);
        }
        self.series
            .get(&series_key(symbol, Interval::Day))
            .and_then(|s| s.last().map(|c| c.close))
    }
}

impl Default for PaperMarketData {
    fn default() -> Self {
        Self::new()
    }
}

fn read_candle_csv(path: &Path) -> Result<Vec<Candle>, EngineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| EngineError::InvalidData(format!("{path:?}: {e}")))?;

    let mut candles = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| EngineError::InvalidData(e.to_string()))?;
        if record.len() < 6 {
            return Err(EngineError::InvalidData(format!(
                "{path:?}: expected 6 columns, got {}",
                record.len()
            )));
        }
        let timestamp = record[0]
            .parse::<DateTime<Utc>>()
            .map_err(|e| EngineError::InvalidData(format!("{path:?}: bad timestamp: {e}")))?;
        let parse = |i: usize| -> Result<f64, EngineError> {
            record[i]
                .parse::<f64>()
                .map_err(|e| EngineError::InvalidData(format!("{path:?}: column {i}: {e}")))
        };
        candles.push(Candle {
            timestamp,
            open: parse(1)?,
            high: parse(2)?,
            low: parse(3)?,
            close: parse(4)?,
            volume: parse(5)?,
        });
    }
    Ok(candles)
}

#[async_trait]
impl MarketDataSource for PaperMarketData {
    async fn candles(
        &self,
        symbol: &str,
        interval: Interval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, EngineError> {
        let series = self
            .series
            .get(&series_key(symbol, interval))
            .ok_or_else(|| EngineError::NoData(symbol.to_string()))?;
        let slice: Vec<Candle> = series
            .iter()
            .filter(|c| c.timestamp >= from && c.timestamp <= to)
            .cloned()
            .collect();
        if slice.is_empty() {
            return Err(EngineError::NoData(symbol.to_string()));
        }
        Ok(slice)
    }

    async fn quote(&self, symbol: &str) -> Result<Quote, EngineError> {
        if let Some(q) = self.quotes.get(symbol) {
            return Ok(q.clone());
        }
        // Fall back to the latest daily candle
        let series = self
            .series
            .get(&series_key(symbol, Interval::Day))
            .ok_or_else(|| EngineError::NoData(symbol.to_string()))?;
        let last = series
            .last()
            .ok_or_else(|| EngineError::NoData(symbol.to_string()))?;
        Ok(Quote {
            symbol: symbol.to_string(),
            last_price: last.close,
            volume: last.volume,
            buy_quantity: 0,
            sell_quantity: 0,
        })
    }
}

// ---------------------------------------------------------------------------
// Paper broker: instant fills at the last known price
// ---------------------------------------------------------------------------

struct PaperBook {
    margins: MarginSummary,
    positions: HashMap<String, Position>,
    orders: HashMap<String, OrderSnapshot>,
}

/// Simulated broker account. Market orders fill instantly at the last
/// known price; stop orders rest as OPEN until cancelled. Margin usage
/// tracks the gross value of open positions.
pub struct PaperBroker {
    data: Arc<PaperMarketData>,
    book: Mutex<PaperBook>,
}

impl PaperBroker {
    pub fn new(data: Arc<PaperMarketData>, starting_margin: f64) -> Self {
        Self {
            data,
            book: Mutex::new(PaperBook {
                margins: MarginSummary {
                    available: starting_margin,
                    used: 0.0,
                },
                positions: HashMap::new(),
                orders: HashMap::new(),
            }),
        }
    }

    fn apply_fill(book: &mut PaperBook, order: &OrderRequest, price: f64) {
        let signed_qty = match order.side {
            OrderSide::Buy => order.quantity,
            OrderSide::Sell => -order.quantity,
        };
        let pos = book
            .positions
            .entry(order.symbol.clone())
            .or_insert_with(|| Position {
                symbol: order.symbol.clone(),
                quantity: 0,
                avg_price: 0.0,
                last_price: price,
                pnl: 0.0,
                product: order.product,
            });

        let prior_qty = pos.quantity;
        let new_qty = prior_qty + signed_qty;
        if prior_qty == 0 || prior_qty.signum() == signed_qty.signum() {
            // Opening or adding: volume-weighted average entry
            let total = pos.avg_price * prior_qty.abs() as f64 + price * signed_qty.abs() as f64;
            pos.avg_price = total / (prior_qty.abs() + signed_qty.abs()) as f64;
        } else {
            // Reducing or closing: realize P&L on the closed quantity
            let closed = signed_qty.abs().min(prior_qty.abs());
            let per_share = if prior_qty > 0 {
                price - pos.avg_price
            } else {
                pos.avg_price - price
            };
            pos.pnl += per_share * closed as f64;
        }
        pos.quantity = new_qty;
        pos.last_price = price;

        let margin_delta = price * signed_qty.abs() as f64;
        if new_qty.abs() > prior_qty.abs() {
            book.margins.used += margin_delta;
            book.margins.available -= margin_delta;
        } else {
            let released = price * (prior_qty.abs() - new_qty.abs()) as f64;
            book.margins.used = (book.margins.used - released).max(0.0);
            book.margins.available += released;
        }
    }
}

#[async_trait]
impl BrokerClient for PaperBroker {
    async fn margins(&self) -> Result<MarginSummary, EngineError> {
        Ok(self.book.lock().unwrap().margins)
    }

    async fn positions(&self) -> Result<Vec<Position>, EngineError> {
        Ok(self
            .book
            .lock()
            .unwrap()
            .positions
            .values()
            .cloned()
            .collect())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<String, EngineError> {
        let price = match order.order_type {
            OrderType::Limit => order.price,
            _ => None,
        }
        .or_else(|| self.data.last_price(&order.symbol))
        .ok_or_else(|| EngineError::NoData(order.symbol.clone()))?;

        let order_id = Uuid::new_v4().to_string();
        let mut book = self.book.lock().unwrap();

        let snapshot = match order.order_type {
            OrderType::Market | OrderType::Limit => {
                Self::apply_fill(&mut book, order, price);
                OrderSnapshot {
                    order_id: order_id.clone(),
                    status: OrderStatus::Complete,
                    filled_quantity: order.quantity,
                    pending_quantity: 0,
                    average_price: Some(price),
                }
            }
            // Stop orders rest on the book; the simulation never triggers them
            OrderType::StopLossLimit | OrderType::StopLossMarket => OrderSnapshot {
                order_id: order_id.clone(),
                status: OrderStatus::Open,
                filled_quantity: 0,
                pending_quantity: order.quantity,
                average_price: None,
            },
        };

        tracing::debug!(
            "Paper order {}: {:?} {} x{} -> {:?}",
            order_id,
            order.side,
            order.symbol,
            order.quantity,
            snapshot.status
        );
        book.orders.insert(order_id.clone(), snapshot);
        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), EngineError> {
        let mut book = self.book.lock().unwrap();
        let order = book
            .orders
            .get_mut(order_id)
            .ok_or_else(|| EngineError::OrderFailure(format!("unknown order {order_id}")))?;
        if order.status == OrderStatus::Complete {
            return Err(EngineError::OrderFailure(format!(
                "order {order_id} already complete"
            )));
        }
        order.status = OrderStatus::Cancelled;
        order.pending_quantity = 0;
        Ok(())
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderSnapshot, EngineError> {
        self.book
            .lock()
            .unwrap()
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| EngineError::OrderFailure(format!("unknown order {order_id}")))
    }

    fn is_paper(&self) -> bool {
        true
    }

    fn broker_name(&self) -> &str {
        "paper"
    }
}
