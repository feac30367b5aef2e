use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use broker_api::BrokerClient;
use market_surveillance::ManipulationDetector;
use risk_engine::{PortfolioLedger, SizingRequest};
use technical_engine::{
    classify_trend, compute_snapshot, fusion, patterns, validate_momentum, FusionInputs,
};
use trading_core::{
    EngineError, Interval, MarketDataSource, PositionSizing, SentimentSource, SignalAction,
};

use crate::executor::{ExecutionReport, OrderExecutor, OrderState};
use crate::squareoff::{MarketClock, SquareOffResult, SquareOffScheduler};

/// History fetched per producer, in days.
const INDICATOR_DAYS: i64 = 30;
const TREND_DAYS: i64 = 30;
const PATTERN_DAYS: i64 = 5;
const LEVEL_DAYS: i64 = 45;
const VOLUME_DAYS: i64 = 30;

/// The fixed evaluation pipeline: four technical producers and the
/// surveillance pass fan out per symbol, fuse into a decision, size
/// against the serialized portfolio ledger, and hand approved sizings to
/// the executor. What runs next is decided here at compile time, not by
/// any caller-side orchestration.
pub struct TradeEngine {
    market_data: Arc<dyn MarketDataSource>,
    broker: Arc<dyn BrokerClient>,
    sentiment: Option<Arc<dyn SentimentSource>>,
    ledger: Arc<PortfolioLedger>,
    executor: Arc<OrderExecutor>,
    squareoff: Arc<SquareOffScheduler>,
    subsignal_timeout: Duration,
}

impl TradeEngine {
    pub fn new(
        market_data: Arc<dyn MarketDataSource>,
        broker: Arc<dyn BrokerClient>,
        sentiment: Option<Arc<dyn SentimentSource>>,
        clock: MarketClock,
        capital: f64,
        subsignal_timeout: Duration,
    ) -> Self {
        let halted = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let executor = Arc::new(OrderExecutor::new(Arc::clone(&broker), Arc::clone(&halted)));
        let squareoff = Arc::new(SquareOffScheduler::new(
            Arc::clone(&broker),
            Arc::clone(&executor),
            clock,
            halted,
        ));
        Self {
            market_data,
            broker,
            sentiment,
            ledger: Arc::new(PortfolioLedger::new(capital)),
            executor,
            squareoff,
            subsignal_timeout,
        }
    }

    pub fn ledger(&self) -> &PortfolioLedger {
        &self.ledger
    }

    pub fn executor(&self) -> &Arc<OrderExecutor> {
        &self.executor
    }

    fn not_traded(symbol: &str, reason: String) -> PositionSizing {
        PositionSizing {
            symbol: symbol.to_string(),
            action: SignalAction::Wait,
            approved: false,
            quantity: 0,
            entry: 0.0,
            stop_loss: 0.0,
            target: None,
            capital_allocated: 0.0,
            capital_pct: 0.0,
            risk_amount: 0.0,
            risk_pct: 0.0,
            rejection_reason: Some(reason),
        }
    }

    /// Evaluate one symbol end to end. Data problems degrade the result
    /// to an unapproved sizing; only infrastructure failures (quote or
    /// portfolio refresh) surface as errors, and neither kind may abort
    /// the caller's loop over other symbols.
    pub async fn evaluate(
        &self,
        symbol: &str,
        capital: f64,
        risk_appetite: f64,
    ) -> Result<PositionSizing, EngineError> {
        let (margins, positions) = tokio::join!(self.broker.margins(), self.broker.positions());
        self.ledger.refresh(margins?, positions?);

        let quote = self.market_data.quote(symbol).await?;
        let now = Utc::now();
        let timeout = self.subsignal_timeout;

        macro_rules! producer {
            ($label:expr, $fut:expr) => {
                async {
                    match tokio::time::timeout(timeout, $fut).await {
                        Ok(Ok(value)) => Some(value),
                        Ok(Err(e)) => {
                            tracing::warn!("{} unavailable for {}: {}", $label, symbol, e);
                            None
                        }
                        Err(_) => {
                            tracing::warn!("{} timed out for {}", $label, symbol);
                            None
                        }
                    }
                }
            };
        }

        let (snapshot, trend, scan, momentum, manipulation) = tokio::join!(
            producer!("indicator snapshot", async {
                let candles = self
                    .market_data
                    .candles(
                        symbol,
                        Interval::Minute5,
                        now - chrono::Duration::days(INDICATOR_DAYS),
                        now,
                    )
                    .await?;
                compute_snapshot(&candles)
            }),
            producer!("trend classification", async {
                let candles = self
                    .market_data
                    .candles(
                        symbol,
                        Interval::Minute15,
                        now - chrono::Duration::days(TREND_DAYS),
                        now,
                    )
                    .await?;
                classify_trend(&candles)
            }),
            producer!("pattern scan", async {
                let intraday = self
                    .market_data
                    .candles(
                        symbol,
                        Interval::Minute5,
                        now - chrono::Duration::days(PATTERN_DAYS),
                        now,
                    )
                    .await?;
                let daily = self
                    .market_data
                    .candles(
                        symbol,
                        Interval::Day,
                        now - chrono::Duration::days(LEVEL_DAYS),
                        now,
                    )
                    .await?;
                patterns::scan(&intraday, &daily)
            }),
            producer!("momentum validation", async {
                let daily = self
                    .market_data
                    .candles(
                        symbol,
                        Interval::Day,
                        now - chrono::Duration::days(VOLUME_DAYS),
                        now,
                    )
                    .await?;
                let fast = self
                    .market_data
                    .candles(
                        symbol,
                        Interval::Minute1,
                        now - chrono::Duration::days(1),
                        now,
                    )
                    .await?;
                validate_momentum(&quote, &daily, &fast)
            }),
            producer!("surveillance", async {
                let daily = self
                    .market_data
                    .candles(
                        symbol,
                        Interval::Day,
                        now - chrono::Duration::days(VOLUME_DAYS),
                        now,
                    )
                    .await?;
                let intraday = self
                    .market_data
                    .candles(
                        symbol,
                        Interval::Minute5,
                        now - chrono::Duration::days(PATTERN_DAYS),
                        now,
                    )
                    .await?;
                ManipulationDetector::assess(&quote, &daily, &intraday)
            }),
        );

        let signal = fusion::fuse(
            symbol,
            &FusionInputs {
                snapshot: snapshot.as_ref(),
                trend: trend.as_ref(),
                patterns: scan.as_ref(),
                momentum: momentum.as_ref(),
            },
        );

        // Without a surveillance read we cannot rule manipulation out
        let manipulation = match manipulation {
            Some(m) => m,
            None => {
                return Ok(Self::not_traded(
                    symbol,
                    "surveillance data unavailable".to_string(),
                ))
            }
        };

        let sentiment = match &self.sentiment {
            Some(source) => match tokio::time::timeout(timeout, source.sentiment(symbol)).await {
                Ok(Ok(s)) => Some(s),
                Ok(Err(e)) => {
                    tracing::warn!("Sentiment unavailable for {}: {}", symbol, e);
                    None
                }
                Err(_) => {
                    tracing::warn!("Sentiment timed out for {}", symbol);
                    None
                }
            },
            None => None,
        };

        let decision = crate::decider::StrategyDecider::decide(&signal, sentiment, &manipulation);
        tracing::info!(
            "Decision for {}: {:?} (confidence {:.2})",
            symbol,
            decision.action,
            decision.confidence
        );

        if !decision.action.is_entry() {
            let mut reasons = decision.conflict_notes.clone();
            reasons.extend(signal.reasons.iter().cloned());
            return Ok(Self::not_traded(
                symbol,
                if reasons.is_empty() {
                    "no trade signal".to_string()
                } else {
                    reasons.join("; ")
                },
            ));
        }

        // Entry signals always carry prices
        let entry = signal
            .entry
            .ok_or_else(|| EngineError::InvalidData("entry signal without prices".to_string()))?;
        let stop_loss = signal
            .stop_loss
            .ok_or_else(|| EngineError::InvalidData("entry signal without stop".to_string()))?;

        self.ledger.size_and_reserve(&SizingRequest {
            decision: &decision,
            capital,
            risk_appetite,
            entry,
            stop_loss,
            target: signal.target,
        })
    }

    /// Place the entry and protective stop for an approved sizing.
    /// Reserved capital is returned to the ledger if nothing ends up
    /// on the book.
    pub async fn execute(&self, sizing: &PositionSizing) -> Result<ExecutionReport, EngineError> {
        match self.executor.execute_entry(sizing).await {
            Ok(report) => {
                if matches!(
                    report.state,
                    OrderState::Rejected | OrderState::Cancelled | OrderState::Failed
                ) {
                    self.ledger.release(sizing);
                }
                Ok(report)
            }
            Err(e) => {
                self.ledger.release(sizing);
                Err(e)
            }
        }
    }

    /// Run the end-of-day sweep if it is due.
    pub async fn square_off_sweep(
        &self,
        now: chrono::DateTime<Utc>,
    ) -> Result<Option<SquareOffResult>, EngineError> {
        self.squareoff.sweep(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_api::{PaperBroker, PaperMarketData};
    use trading_core::{Candle, Quote};

    fn flat_candles(interval_minutes: i64, n: usize, close: f64, volume: f64) -> Vec<Candle> {
        // Recent timestamps so the engine's lookback windows include them
        let start = Utc::now() - chrono::Duration::minutes(interval_minutes * n as i64);
        (0..n)
            .map(|i| Candle {
                timestamp: start + chrono::Duration::minutes(interval_minutes * i as i64),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume,
            })
            .collect()
    }

    fn seeded_market(quote_volume: f64) -> Arc<PaperMarketData> {
        let data = Arc::new(PaperMarketData::new());
        data.insert_series("INFY", Interval::Minute5, flat_candles(5, 80, 100.0, 50_000.0));
        data.insert_series("INFY", Interval::Minute15, flat_candles(15, 80, 100.0, 50_000.0));
        data.insert_series("INFY", Interval::Minute1, flat_candles(1, 30, 100.0, 50_000.0));
        // Daily history: ~45 days back
        let daily: Vec<Candle> = (0..45)
            .map(|i| Candle {
                timestamp: Utc::now() - chrono::Duration::days(45 - i),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1_000_000.0,
            })
            .collect();
        data.insert_series("INFY", Interval::Day, daily);
        data.set_quote(Quote {
            symbol: "INFY".to_string(),
            last_price: 100.0,
            volume: quote_volume,
            buy_quantity: 1_000,
            sell_quantity: 1_000,
        });
        data
    }

    fn engine(data: Arc<PaperMarketData>) -> TradeEngine {
        let broker = Arc::new(PaperBroker::new(Arc::clone(&data), 1_000_000.0));
        TradeEngine::new(
            data,
            broker,
            None,
            MarketClock::exchange_default(),
            1_000_000.0,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn flat_tape_with_normal_volume_waits() {
        // No aligned signals and volume only 1x average: WAIT, not an error
        let engine = engine(seeded_market(1_000_000.0));
        let sizing = engine.evaluate("INFY", 1_000_000.0, 0.5).await.unwrap();
        assert!(!sizing.approved);
        assert_eq!(sizing.action, SignalAction::Wait);
        assert!(sizing.rejection_reason.is_some());
    }

    #[tokio::test]
    async fn extreme_volume_is_vetoed_not_errored() {
        // 6x average volume trips the surveillance veto before anything else
        let engine = engine(seeded_market(6_000_000.0));
        let sizing = engine.evaluate("INFY", 1_000_000.0, 0.5).await.unwrap();
        assert!(!sizing.approved);
        assert_eq!(sizing.action, SignalAction::Wait);
    }

    #[tokio::test]
    async fn missing_series_degrades_to_wait() {
        // Only daily data exists: every producer that needs intraday
        // candles reports absent, and fusion degrades to WAIT
        let data = Arc::new(PaperMarketData::new());
        let daily: Vec<Candle> = (0..45)
            .map(|i| Candle {
                timestamp: Utc::now() - chrono::Duration::days(45 - i),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1_000_000.0,
            })
            .collect();
        data.insert_series("INFY", Interval::Day, daily);

        let engine = engine(data);
        let sizing = engine.evaluate("INFY", 1_000_000.0, 0.5).await.unwrap();
        assert!(!sizing.approved);
        assert_eq!(sizing.action, SignalAction::Wait);
    }

    #[tokio::test]
    async fn unknown_symbol_is_an_error() {
        let engine = engine(Arc::new(PaperMarketData::new()));
        let err = engine.evaluate("NOSUCH", 1_000_000.0, 0.5).await.unwrap_err();
        assert!(matches!(err, EngineError::NoData(_)));
    }

    #[tokio::test]
    async fn evaluation_error_for_one_symbol_leaves_engine_usable() {
        let engine = engine(seeded_market(1_000_000.0));
        assert!(engine.evaluate("NOSUCH", 1_000_000.0, 0.5).await.is_err());
        // The next symbol still evaluates normally
        let sizing = engine.evaluate("INFY", 1_000_000.0, 0.5).await.unwrap();
        assert_eq!(sizing.action, SignalAction::Wait);
    }

    #[tokio::test]
    async fn full_chain_from_decision_to_protected_entry() {
        // Drive decider -> ledger -> executor directly with a known-good
        // signal to cover the approved path deterministically
        use crate::decider::StrategyDecider;
        use trading_core::{
            ManipulationAssessment, ManipulationRisk, TechnicalSignal, TradeRecommendation,
        };

        let data = seeded_market(1_000_000.0);
        let engine = engine(data);

        let signal = TechnicalSignal {
            symbol: "INFY".to_string(),
            action: SignalAction::Buy,
            confidence: 0.85,
            entry: Some(100.0),
            stop_loss: Some(95.0),
            target: Some(110.0),
            reasons: vec![],
        };
        let assessment = ManipulationAssessment {
            symbol: "INFY".to_string(),
            risk: ManipulationRisk::Low,
            evidence: vec![],
            recommendation: TradeRecommendation::Safe,
            volume_ratio: 1.0,
            volume_zscore: 0.0,
            price_change_pct: 0.0,
            max_swing_pct: 0.0,
            gap_count: 0,
        };

        let decision = StrategyDecider::decide(&signal, None, &assessment);
        assert_eq!(decision.action, SignalAction::Buy);

        let sizing = engine
            .ledger()
            .size_and_reserve(&SizingRequest {
                decision: &decision,
                capital: 1_000_000.0,
                risk_appetite: 0.5,
                entry: 100.0,
                stop_loss: 95.0,
                target: Some(110.0),
            })
            .unwrap();
        assert!(sizing.approved);
        assert_eq!(sizing.quantity, 1_750);

        let report = engine.execute(&sizing).await.unwrap();
        assert_eq!(report.state, OrderState::Filled);
        assert!(report.stop_order_id.is_some());
        // Reserved capital stays reserved after a successful fill
        assert!(engine.ledger().snapshot().deployed_capital > 0.0);
    }
}
