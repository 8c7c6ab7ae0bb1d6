//! Exchange market-data adapters
//!
//! Every adapter exposes the same two public-data calls through
//! [`CandleSource`]. The overview assembler looks adapters up by
//! [`ExchangeId`] in a [`SourceRegistry`], so symbols on different venues are
//! analyzed by the same pipeline.

pub mod binance;
pub mod bitget;

pub use binance::BinanceSource;
pub use bitget::BitgetSource;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration as StdDuration;

use crate::{Candle, Symbol};

/// HTTP timeout shared by all live adapters
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Maximum bars a single kline request may return
pub const MAX_CANDLES_PER_REQUEST: usize = 1000;

/// Supported market-data venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeId {
    Binance,
    Bitget,
    /// Local CSV files
    Csv,
}

impl ExchangeId {
    pub const ALL: [ExchangeId; 3] = [ExchangeId::Binance, ExchangeId::Bitget, ExchangeId::Csv];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Binance => "binance",
            ExchangeId::Bitget => "bitget",
            ExchangeId::Csv => "csv",
        }
    }
}

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only OHLCV and ticker access for one venue
pub trait CandleSource: Send + Sync {
    /// Adapter name for logs
    fn name(&self) -> &str;

    /// Most recent `limit` bars, ascending by timestamp
    fn fetch_candles(&self, symbol: &Symbol, timeframe: &str, limit: usize) -> Result<Vec<Candle>>;

    /// Last traded price
    fn fetch_price(&self, symbol: &Symbol) -> Result<f64>;
}

impl<S: CandleSource + ?Sized> CandleSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch_candles(&self, symbol: &Symbol, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        (**self).fetch_candles(symbol, timeframe, limit)
    }

    fn fetch_price(&self, symbol: &Symbol) -> Result<f64> {
        (**self).fetch_price(symbol)
    }
}

/// Adapters keyed by venue
#[derive(Default)]
pub struct SourceRegistry {
    sources: HashMap<ExchangeId, Box<dyn CandleSource>>,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("exchanges", &self.exchanges())
            .finish()
    }
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the live Binance and Bitget adapters
    pub fn live() -> Result<Self> {
        let mut registry = SourceRegistry::new();
        registry.register(ExchangeId::Binance, BinanceSource::new()?);
        registry.register(ExchangeId::Bitget, BitgetSource::new()?);
        Ok(registry)
    }

    /// Register (or replace) the adapter for `id`
    pub fn register(&mut self, id: ExchangeId, source: impl CandleSource + 'static) {
        self.sources.insert(id, Box::new(source));
    }

    pub fn get(&self, id: ExchangeId) -> Option<&dyn CandleSource> {
        self.sources.get(&id).map(|s| s.as_ref())
    }

    /// Registered venues, sorted
    pub fn exchanges(&self) -> Vec<ExchangeId> {
        let mut ids: Vec<ExchangeId> = self.sources.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Wrap every registered adapter with `wrap`
    pub fn map_sources<F>(self, mut wrap: F) -> Self
    where
        F: FnMut(ExchangeId, Box<dyn CandleSource>) -> Box<dyn CandleSource>,
    {
        SourceRegistry {
            sources: self
                .sources
                .into_iter()
                .map(|(id, source)| (id, wrap(id, source)))
                .collect(),
        }
    }
}

/// Blocking HTTP client used by the live adapters
pub(crate) fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(StdDuration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .context("Failed to create HTTP client")
}

/// Exchanges send numbers either as JSON numbers or as decimal strings.
/// `NaN` and infinities are rejected.
pub(crate) fn parse_number(value: &serde_json::Value) -> Option<f64> {
    let number = match value {
        serde_json::Value::String(s) => s.parse::<f64>().ok(),
        other => other.as_f64(),
    };
    number.filter(|v| v.is_finite())
}

/// Parse every raw candle row; one malformed row fails the whole window
pub(crate) fn parse_rows<F>(
    rows: &[Vec<serde_json::Value>],
    parse: F,
    venue: &str,
    pair: &str,
) -> Result<Vec<Candle>>
where
    F: Fn(&[serde_json::Value]) -> Option<Candle>,
{
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            parse(row).with_context(|| {
                format!("Malformed {} candle {} for {}: {:?}", venue, i, pair, row)
            })
        })
        .collect()
}

pub(crate) fn parse_timestamp(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::String(s) => s.parse().ok(),
        other => other.as_i64(),
    }
}

/// Sort ascending, drop duplicate timestamps and keep the newest `limit` bars
pub(crate) fn finalize_window(mut candles: Vec<Candle>, limit: usize) -> Vec<Candle> {
    candles.sort_by_key(|c| c.datetime);
    candles.dedup_by_key(|c| c.datetime);
    if candles.len() > limit {
        candles.drain(..candles.len() - limit);
    }
    candles
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    struct FixedSource {
        price: f64,
    }

    impl CandleSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fetch_candles(&self, _: &Symbol, _: &str, _: usize) -> Result<Vec<Candle>> {
            Ok(vec![])
        }

        fn fetch_price(&self, _: &Symbol) -> Result<f64> {
            Ok(self.price)
        }
    }

    #[test]
    fn test_exchange_id_serde() {
        let id: ExchangeId = serde_json::from_str("\"bitget\"").unwrap();
        assert_eq!(id, ExchangeId::Bitget);
        assert_eq!(serde_json::to_string(&ExchangeId::Csv).unwrap(), "\"csv\"");
        assert_eq!(ExchangeId::Binance.to_string(), "binance");
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = SourceRegistry::new();
        registry.register(ExchangeId::Csv, FixedSource { price: 42.0 });

        let source = registry.get(ExchangeId::Csv).unwrap();
        assert_eq!(source.name(), "fixed");
        assert_eq!(source.fetch_price(&Symbol::new("BTC/USDT")).unwrap(), 42.0);
        assert!(registry.get(ExchangeId::Binance).is_none());
        assert_eq!(registry.exchanges(), vec![ExchangeId::Csv]);
    }

    #[test]
    fn test_parse_number_accepts_strings() {
        assert_eq!(parse_number(&serde_json::json!("1.5")), Some(1.5));
        assert_eq!(parse_number(&serde_json::json!(2.5)), Some(2.5));
        assert_eq!(parse_number(&serde_json::json!("abc")), None);
        assert_eq!(parse_timestamp(&serde_json::json!("1700000000000")), Some(1_700_000_000_000));
    }

    #[test]
    fn test_parse_number_rejects_non_finite() {
        assert_eq!(parse_number(&serde_json::json!("NaN")), None);
        assert_eq!(parse_number(&serde_json::json!("inf")), None);
        assert_eq!(parse_number(&serde_json::json!("-infinity")), None);
    }

    #[test]
    fn test_parse_rows_fails_on_malformed_row() {
        let good = vec![
            serde_json::json!(1_700_000_000_000i64),
            serde_json::json!("1.0"),
            serde_json::json!("2.0"),
            serde_json::json!("0.5"),
            serde_json::json!("1.5"),
            serde_json::json!("10"),
        ];
        let mut garbage = good.clone();
        garbage[2] = serde_json::json!("NaN");

        let parse = |row: &[serde_json::Value]| {
            Candle::from_millis(
                parse_timestamp(&row[0])?,
                parse_number(&row[1])?,
                parse_number(&row[2])?,
                parse_number(&row[3])?,
                parse_number(&row[4])?,
                parse_number(&row[5])?,
            )
        };

        let parsed = parse_rows(&[good.clone()], parse, "test", "BTCUSDT").unwrap();
        assert_eq!(parsed.len(), 1);

        let err = parse_rows(&[good, garbage], parse, "test", "BTCUSDT").unwrap_err();
        assert!(err.to_string().contains("Malformed test candle 1 for BTCUSDT"));
    }

    #[test]
    fn test_finalize_window() {
        let start = Utc::now();
        let bar = |h: i64| Candle::new_unchecked(start + Duration::hours(h), 1.0, 1.0, 1.0, 1.0, 1.0);
        let candles = vec![bar(3), bar(1), bar(2), bar(2), bar(0)];

        let window = finalize_window(candles, 3);

        let hours: Vec<i64> = window
            .iter()
            .map(|c| (c.datetime - start).num_hours())
            .collect();
        assert_eq!(hours, vec![1, 2, 3]);
    }
}
