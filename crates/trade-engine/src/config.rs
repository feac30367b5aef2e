use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Symbols to evaluate each scan
    pub watchlist: Vec<String>,
    /// Total session capital
    pub capital: f64,
    /// 0.0 = conservative, 1.0 = aggressive
    pub risk_appetite: f64,

    // Scan loop
    pub scan_interval_seconds: u64,
    pub subsignal_timeout_seconds: u64,
    pub trading_enabled: bool,

    // Universe gates
    pub min_price: f64,
    pub min_avg_volume: f64,

    // Paper data
    pub candle_dir: String,
}

impl SessionConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            watchlist: env::var("WATCHLIST")
                .unwrap_or_else(|_| "RELIANCE,INFY,TCS,TATAMOTORS,HDFCBANK".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            capital: env::var("CAPITAL")
                .unwrap_or_else(|_| "1000000".to_string())
                .parse()
                .context("CAPITAL must be a number")?,
            risk_appetite: env::var("RISK_APPETITE")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()
                .context("RISK_APPETITE must be a number in [0, 1]")?,

            scan_interval_seconds: env::var("SCAN_INTERVAL")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
            subsignal_timeout_seconds: env::var("SUBSIGNAL_TIMEOUT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            trading_enabled: env::var("TRADING_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,

            min_price: env::var("MIN_PRICE")
                .unwrap_or_else(|_| "20.0".to_string())
                .parse()?,
            min_avg_volume: env::var("MIN_AVG_VOLUME")
                .unwrap_or_else(|_| "100000".to_string())
                .parse()?,

            candle_dir: env::var("CANDLE_DIR").unwrap_or_else(|_| "data/candles".to_string()),
        };

        if !(0.0..=1.0).contains(&config.risk_appetite) {
            anyhow::bail!(
                "RISK_APPETITE {} outside [0, 1]",
                config.risk_appetite
            );
        }
        if config.capital <= 0.0 {
            anyhow::bail!("CAPITAL must be positive");
        }

        Ok(config)
    }
}
