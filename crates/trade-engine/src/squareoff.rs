use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use broker_api::BrokerClient;
use trading_core::{EngineError, OrderRequest, OrderSide, ProductType};

use crate::executor::OrderExecutor;

pub const SQUARE_OFF_TAG: &str = "SQUARE_OFF";

/// Exchange-local trading calendar and session times.
#[derive(Debug, Clone, Copy)]
pub struct MarketClock {
    tz: Tz,
}

impl MarketClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// NSE equities session in IST.
    pub fn exchange_default() -> Self {
        Self::new(chrono_tz::Asia::Kolkata)
    }

    fn open_time() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 15, 0).unwrap()
    }

    fn close_time() -> NaiveTime {
        NaiveTime::from_hms_opt(15, 30, 0).unwrap()
    }

    fn square_off_time() -> NaiveTime {
        NaiveTime::from_hms_opt(15, 10, 0).unwrap()
    }

    fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        now.with_timezone(&self.tz).time()
    }

    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    pub fn is_trading_day(&self, now: DateTime<Utc>) -> bool {
        self.local_date(now).weekday().num_days_from_monday() < 5
    }

    /// Inside the [09:15, 15:30) session on a trading day.
    pub fn is_market_open(&self, now: DateTime<Utc>) -> bool {
        if !self.is_trading_day(now) {
            return false;
        }
        let t = self.local_time(now);
        t >= Self::open_time() && t < Self::close_time()
    }

    /// Past the square-off deadline on a trading day.
    pub fn square_off_due(&self, now: DateTime<Utc>) -> bool {
        self.is_trading_day(now) && self.local_time(now) >= Self::square_off_time()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquareOffFailure {
    pub symbol: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquareOffResult {
    pub positions_closed: usize,
    pub total_realized_pnl: f64,
    pub failures: Vec<SquareOffFailure>,
}

/// Forces all open intraday positions closed at the session deadline.
///
/// One-way per trading day: the halt flag goes up before any close order
/// is issued, so entry placements racing the sweep lose, and the sweep is
/// not re-armed until the next trading day.
pub struct SquareOffScheduler {
    broker: Arc<dyn BrokerClient>,
    executor: Arc<OrderExecutor>,
    clock: MarketClock,
    halted: Arc<AtomicBool>,
    last_sweep: Mutex<Option<NaiveDate>>,
}

impl SquareOffScheduler {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        executor: Arc<OrderExecutor>,
        clock: MarketClock,
        halted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            broker,
            executor,
            clock,
            halted,
            last_sweep: Mutex::new(None),
        }
    }

    /// Run the sweep if it is due and has not already run today.
    /// Per-position close failures are collected, not fatal.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Option<SquareOffResult>, EngineError> {
        if !self.clock.square_off_due(now) {
            return Ok(None);
        }
        let today = self.clock.local_date(now);
        if *self.last_sweep.lock().unwrap() == Some(today) {
            return Ok(None);
        }

        // Entries stop before the first close order goes out
        self.halted.store(true, Ordering::SeqCst);
        tracing::info!("Square-off deadline reached, halting entries and sweeping");

        let positions = self.broker.positions().await?;
        *self.last_sweep.lock().unwrap() = Some(today);

        let mut closed = 0;
        let mut total_pnl = 0.0;
        let mut failures = Vec::new();

        for pos in positions
            .iter()
            .filter(|p| p.product == ProductType::Intraday && p.quantity != 0)
        {
            if let Err(e) = self.executor.cancel_protective(&pos.symbol).await {
                tracing::warn!("Could not cancel stop for {}: {}", pos.symbol, e);
                failures.push(SquareOffFailure {
                    symbol: pos.symbol.clone(),
                    error: format!("stop cancel: {e}"),
                });
            }

            let side = if pos.quantity > 0 {
                OrderSide::Sell
            } else {
                OrderSide::Buy
            };
            let close_order = OrderRequest::market(&pos.symbol, side, pos.quantity.abs())
                .with_tag(SQUARE_OFF_TAG);

            match self.executor.place_with_retry(&close_order).await {
                Ok(order_id) => {
                    tracing::info!(
                        "Squared off {} x{} ({:?}, order {}, pnl {:.2})",
                        pos.symbol,
                        pos.quantity.abs(),
                        side,
                        order_id,
                        pos.pnl
                    );
                    closed += 1;
                    total_pnl += pos.pnl;
                }
                Err(e) => {
                    tracing::error!("Square-off failed for {}: {}", pos.symbol, e);
                    failures.push(SquareOffFailure {
                        symbol: pos.symbol.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(Some(SquareOffResult {
            positions_closed: closed,
            total_realized_pnl: total_pnl,
            failures,
        }))
    }
}
