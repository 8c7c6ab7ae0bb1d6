//! Bitget spot public market data (v2 API)

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use super::{
    finalize_window, http_client, parse_number, parse_rows, parse_timestamp, CandleSource,
    MAX_CANDLES_PER_REQUEST,
};
use crate::{Candle, Symbol};

const BITGET_API_BASE: &str = "https://api.bitget.com/api/v2/spot/market";

/// Success code in the Bitget response envelope
const BITGET_OK: &str = "00000";

/// Bitget response envelope: `{ "code", "msg", "data" }`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self, what: &str) -> Result<T> {
        if self.code != BITGET_OK {
            anyhow::bail!("Bitget {} error {}: {}", what, self.code, self.msg);
        }
        self.data
            .with_context(|| format!("Bitget {} response has no data", what))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker {
    symbol: String,
    last_pr: String,
}

/// Map a unified timeframe onto Bitget's granularity names
pub fn granularity(timeframe: &str) -> Option<&'static str> {
    let value = match timeframe {
        "1m" => "1min",
        "5m" => "5min",
        "15m" => "15min",
        "30m" => "30min",
        "1h" => "1h",
        "4h" => "4h",
        "6h" => "6h",
        "12h" => "12h",
        "1d" => "1day",
        "3d" => "3day",
        "1w" => "1week",
        "1M" => "1M",
        _ => return None,
    };
    Some(value)
}

/// Parse one candle row: `[ts, open, high, low, close, base_volume, ...]`
pub fn parse_candle(raw: &[serde_json::Value]) -> Option<Candle> {
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

/// Bitget spot adapter
#[derive(Debug, Clone)]
pub struct BitgetSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl BitgetSource {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BITGET_API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Ok(BitgetSource {
            client: http_client()?,
            base_url: base_url.into(),
        })
    }

    fn get<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, endpoint))
            .query(params)
            .send()
            .with_context(|| format!("Failed to send {} request to Bitget", endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            anyhow::bail!("Bitget API error {}: {}", status, body);
        }

        let envelope: Envelope<T> = response
            .json()
            .with_context(|| format!("Failed to parse Bitget {} response", endpoint))?;
        envelope.into_data(endpoint)
    }
}

impl CandleSource for BitgetSource {
    fn name(&self) -> &str {
        "bitget"
    }

    fn fetch_candles(&self, symbol: &Symbol, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        let granularity = granularity(timeframe)
            .with_context(|| format!("Unsupported Bitget timeframe: {}", timeframe))?;
        let pair = symbol.pair_code();
        let limit = limit.min(MAX_CANDLES_PER_REQUEST);
        let limit_param = limit.to_string();

        debug!(
            "Fetching candles: symbol={}, granularity={}, limit={}",
            pair, granularity, limit
        );

        let rows: Vec<Vec<serde_json::Value>> = self.get(
            "candles",
            &[
                ("symbol", pair.as_str()),
                ("granularity", granularity),
                ("limit", limit_param.as_str()),
            ],
        )?;

        let candles = parse_rows(&rows, parse_candle, "Bitget", &pair)?;
        Ok(finalize_window(candles, limit))
    }

    fn fetch_price(&self, symbol: &Symbol) -> Result<f64> {
        let pair = symbol.pair_code();
        let tickers: Vec<Ticker> = self.get("tickers", &[("symbol", pair.as_str())])?;

        let ticker = tickers
            .into_iter()
            .find(|t| t.symbol == pair)
            .with_context(|| format!("Bitget returned no ticker for {}", pair))?;
        ticker
            .last_pr
            .parse()
            .with_context(|| format!("Invalid Bitget price '{}'", ticker.last_pr))
    }
}
