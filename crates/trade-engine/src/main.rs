use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;

use broker_api::{BrokerClient, PaperBroker, PaperMarketData};
use trading_core::{Interval, MarketDataSource};

use trade_engine::{MarketClock, SessionConfig, TradeEngine};
use trade_engine::universe::universe_rejection;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(env_filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter()).init();
    }

    tracing::info!("Starting intraday trade engine");

    let config = SessionConfig::from_env()?;
    tracing::info!("  Watchlist: {}", config.watchlist.join(", "));
    tracing::info!("  Capital: {:.0}", config.capital);
    tracing::info!("  Risk appetite: {:.2}", config.risk_appetite);
    tracing::info!("  Scan interval: {}s", config.scan_interval_seconds);
    tracing::info!("  Trading enabled: {}", config.trading_enabled);

    let market_data = Arc::new(PaperMarketData::from_csv_dir(&config.candle_dir)?);
    let broker = Arc::new(PaperBroker::new(Arc::clone(&market_data), config.capital));
    tracing::info!(
        "  Broker: {} (paper: {})",
        broker.broker_name(),
        broker.is_paper()
    );

    let clock = MarketClock::exchange_default();
    let engine = TradeEngine::new(
        Arc::clone(&market_data) as Arc<dyn MarketDataSource>,
        Arc::clone(&broker) as Arc<dyn BrokerClient>,
        None,
        clock,
        config.capital,
        Duration::from_secs(config.subsignal_timeout_seconds),
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(config.scan_interval_seconds));
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break;
            }
        }

        let now = Utc::now();

        // Deadline sweep wins over any new entries this tick
        match engine.square_off_sweep(now).await {
            Ok(Some(result)) => {
                tracing::info!(
                    "Square-off complete: {} positions closed, realized P&L {:.2}, {} failures",
                    result.positions_closed,
                    result.total_realized_pnl,
                    result.failures.len()
                );
                for failure in &result.failures {
                    tracing::error!("  {}: {}", failure.symbol, failure.error);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Square-off sweep failed: {e}"),
        }

        if !clock.is_market_open(now) {
            tracing::debug!("Market closed, skipping scan");
            continue;
        }

        for symbol in &config.watchlist {
            // Cheap liquidity gate before the full evaluation
            let gate = async {
                let quote = market_data.quote(symbol).await?;
                let daily = market_data
                    .candles(
                        symbol,
                        Interval::Day,
                        now - chrono::Duration::days(30),
                        now,
                    )
                    .await?;
                Ok::<_, trading_core::EngineError>(universe_rejection(
                    &quote,
                    &daily,
                    config.min_price,
                    config.min_avg_volume,
                ))
            };
            match gate.await {
                Ok(Some(reason)) => {
                    tracing::info!("Skipping {}: {}", symbol, reason);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Universe check failed for {}: {}", symbol, e);
                    continue;
                }
            }

            // One symbol's failure never stops the rest of the scan
            match engine
                .evaluate(symbol, config.capital, config.risk_appetite)
                .await
            {
                Ok(sizing) if sizing.approved => {
                    tracing::info!(
                        "{}: {:?} {} @ {:.2} (stop {:.2}, {:.1}% of capital)",
                        symbol,
                        sizing.action,
                        sizing.quantity,
                        sizing.entry,
                        sizing.stop_loss,
                        sizing.capital_pct
                    );
                    if config.trading_enabled {
                        match engine.execute(&sizing).await {
                            Ok(report) => tracing::info!(
                                "{}: entry {:?}, stop {:?}",
                                symbol,
                                report.state,
                                report.stop_state
                            ),
                            Err(e) => tracing::error!("{}: execution failed: {}", symbol, e),
                        }
                    }
                }
                Ok(sizing) => {
                    tracing::info!(
                        "{}: no trade ({})",
                        symbol,
                        sizing
                            .rejection_reason
                            .as_deref()
                            .unwrap_or("not approved")
                    );
                }
                Err(e) => tracing::warn!("{}: evaluation failed: {}", symbol, e),
            }
        }
    }

    Ok(())
}
