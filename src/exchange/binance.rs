//! Binance spot public market data
//!
//! No API key required for klines or ticker prices.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use super::{
    finalize_window, http_client, parse_number, parse_rows, parse_timestamp, CandleSource,
    MAX_CANDLES_PER_REQUEST,
};
use crate::{Candle, Symbol};

const BINANCE_API_BASE: &str = "https://api.binance.com/api/v3";

/// Valid Binance kline intervals
pub const BINANCE_INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

/// Binance spot adapter
#[derive(Debug, Clone)]
pub struct BinanceSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl BinanceSource {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BINANCE_API_BASE)
    }

    /// Point the adapter at another host (mirrors, test servers)
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Ok(BinanceSource {
            client: http_client()?,
            base_url: base_url.into(),
        })
    }
}

/// Parse one kline row:
/// `[open_time, open, high, low, close, volume, close_time, ...]`
pub fn parse_kline(raw: &[serde_json::Value]) -> Option<Candle> {
    if raw.len() < 6 {
        return None;
    }
    Candle::from_millis(
        parse_timestamp(&raw[0])?,
        parse_number(&raw[1])?,
        parse_number(&raw[2])?,
        parse_number(&raw[3])?,
        parse_number(&raw[4])?,
        parse_number(&raw[5])?,
    )
}

impl CandleSource for BinanceSource {
    fn name(&self) -> &str {
        "binance"
    }

    fn fetch_candles(&self, symbol: &Symbol, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        if !BINANCE_INTERVALS.contains(&timeframe) {
            anyhow::bail!("Unsupported Binance interval: {}", timeframe);
        }

        let pair = symbol.pair_code();
        let limit = limit.min(MAX_CANDLES_PER_REQUEST);
        debug!(
            "Fetching klines: symbol={}, interval={}, limit={}",
            pair, timeframe, limit
        );

        let limit_param = limit.to_string();
        let response = self
            .client
            .get(format!("{}/klines", self.base_url))
            .query(&[
                ("symbol", pair.as_str()),
                ("interval", timeframe),
                ("limit", limit_param.as_str()),
            ])
            .send()
            .context("Failed to send request to Binance")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            anyhow::bail!("Binance API error {}: {}", status, body);
        }

        let rows: Vec<Vec<serde_json::Value>> = response
            .json()
            .context("Failed to parse Binance klines")?;

        let candles = parse_rows(&rows, parse_kline, "Binance", &pair)?;
        Ok(finalize_window(candles, limit))
    }

    fn fetch_price(&self, symbol: &Symbol) -> Result<f64> {
        let pair = symbol.pair_code();
        let response = self
            .client
            .get(format!("{}/ticker/price", self.base_url))
            .query(&[("symbol", pair.as_str())])
            .send()
            .context("Failed to send ticker request to Binance")?;

        if !response.status().is_success() {
            anyhow::bail!("Binance ticker error {} for {}", response.status(), pair);
        }

        let ticker: TickerPrice = response
            .json()
            .context("Failed to parse Binance ticker")?;
        ticker
            .price
            .parse()
            .with_context(|| format!("Invalid Binance price '{}'", ticker.price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_kline() {
        let row = vec![
            json!(1_700_000_000_000_i64),
            json!("37000.10"),
            json!("37100.00"),
            json!("36900.50"),
            json!("37050.00"),
            json!("123.45"),
            json!(1_700_014_399_999_i64),
            json!("4567890.12"),
            json!(1000),
            json!("60.0"),
            json!("2220000.0"),
            json!("0"),
        ];

        let candle = parse_kline(&row).unwrap();
        assert_eq!(candle.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(candle.open, 37000.10);
        assert_eq!(candle.high, 37100.00);
        assert_eq!(candle.low, 36900.50);
        assert_eq!(candle.close, 37050.00);
        assert_eq!(candle.volume, 123.45);
    }

    #[test]
    fn test_parse_kline_rejects_short_rows() {
        assert!(parse_kline(&[json!(1), json!("1.0")]).is_none());
        assert!(parse_kline(&[
            json!(1),
            json!("x"),
            json!("1"),
            json!("1"),
            json!("1"),
            json!("1")
        ])
        .is_none());
    }

    #[test]
    fn test_unsupported_interval() {
        let source = BinanceSource::new().unwrap();
        let err = source
            .fetch_candles(&Symbol::new("BTC/USDT"), "7m", 10)
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported"));
    }
}
