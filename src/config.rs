//! Configuration management
//!
//! Handles loading and validating the JSON configuration file. Per-symbol
//! level gaps and indicator spans are plain immutable structs handed to the
//! analysis pipeline; nothing here is global.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::exchange::ExchangeId;
use crate::levels::FIBONACCI_RATIOS;
use crate::Symbol;

/// Environment variable overriding `market.cache_dir`
pub const CACHE_DIR_ENV: &str = "MARKET_CACHE_DIR";

/// Invalid configuration, rejected before any analysis runs
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("indicator span '{name}' must be positive, got {value}")]
    InvalidSpan { name: &'static str, value: usize },

    #[error("desired gap for {symbol} must be a positive finite number, got {value}")]
    InvalidGap { symbol: String, value: f64 },

    #[error("invalid level settings: {0}")]
    InvalidLevels(String),

    #[error("invalid market settings: {0}")]
    InvalidMarket(String),

    #[error("no symbols configured")]
    NoSymbols,

    #[error("symbol {0} is configured more than once")]
    DuplicateSymbol(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub indicators: IndicatorConfig,
    #[serde(default)]
    pub levels: LevelConfig,
    #[serde(default = "default_symbols")]
    pub symbols: Vec<SymbolConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            market: MarketConfig::default(),
            indicators: IndicatorConfig::default(),
            levels: LevelConfig::default(),
            symbols: default_symbols(),
        }
    }
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env_overrides();
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Load `path` when given, otherwise the built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display())),
            None => {
                let mut config = Config::default();
                config.apply_env_overrides();
                config.validate().context("Invalid configuration")?;
                Ok(config)
            }
        }
    }

    /// Environment overrides (`MARKET_CACHE_DIR`)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(cache_dir) = std::env::var(CACHE_DIR_ENV) {
            if !cache_dir.trim().is_empty() {
                self.market.cache_dir = cache_dir;
            }
        }
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.market.validate()?;
        self.indicators.validate()?;
        self.levels.validate()?;

        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }

        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            symbol.validate()?;
            if !seen.insert(symbol.symbol.as_str()) {
                return Err(ConfigError::DuplicateSymbol(symbol.symbol.clone()));
            }
        }

        Ok(())
    }

    /// Look up a symbol's configuration
    pub fn symbol(&self, symbol: &str) -> Option<&SymbolConfig> {
        self.symbols.iter().find(|s| s.symbol == symbol)
    }
}

/// Market data fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Bar timeframe requested from every exchange (e.g. "1h", "4h")
    pub timeframe: String,
    /// Number of bars analyzed per symbol
    pub limit: usize,
    /// Directory holding the per-symbol OHLCV cache
    pub cache_dir: String,
    /// Max number of candles kept in a cache file
    pub max_cached_candles: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        MarketConfig {
            timeframe: "4h".to_string(),
            limit: 200,
            cache_dir: "market_cache".to_string(),
            max_cached_candles: 3000,
        }
    }
}

impl MarketConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeframe.trim().is_empty() {
            return Err(ConfigError::InvalidMarket("timeframe is empty".to_string()));
        }
        if self.limit == 0 {
            return Err(ConfigError::InvalidMarket("limit must be positive".to_string()));
        }
        if self.max_cached_candles < self.limit {
            return Err(ConfigError::InvalidMarket(format!(
                "max_cached_candles ({}) must be >= limit ({})",
                self.max_cached_candles, self.limit
            )));
        }
        Ok(())
    }
}

/// Indicator spans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// Short-term trend EMA span (default: 21)
    pub ema_span: usize,
    /// Medium-term trend SMA span (default: 30)
    pub sma_span: usize,
    /// RSI period (default: 14)
    pub rsi_period: usize,
    /// ATR period (default: 14)
    pub atr_period: usize,
    /// Volume baseline EMA span (default: 20)
    pub volume_ema_span: usize,
    /// Rolling window for the volume ratio trend (default: 5)
    pub volume_avg_window: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        IndicatorConfig {
            ema_span: 21,
            sma_span: 30,
            rsi_period: 14,
            atr_period: 14,
            volume_ema_span: 20,
            volume_avg_window: 5,
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let spans = [
            ("ema_span", self.ema_span),
            ("sma_span", self.sma_span),
            ("rsi_period", self.rsi_period),
            ("atr_period", self.atr_period),
            ("volume_ema_span", self.volume_ema_span),
            ("volume_avg_window", self.volume_avg_window),
        ];
        for (name, value) in spans {
            if value == 0 {
                return Err(ConfigError::InvalidSpan { name, value });
            }
        }
        Ok(())
    }
}

/// Support/resistance extraction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Bars on each side a high/low must dominate to count as an extremum
    pub radius: usize,
    /// Levels kept per side
    pub max_levels: usize,
    /// Retracement ratios used to backfill missing levels
    pub fibonacci_ratios: Vec<f64>,
}

impl Default for LevelConfig {
    fn default() -> Self {
        LevelConfig {
            radius: 5,
            max_levels: 5,
            fibonacci_ratios: FIBONACCI_RATIOS.to_vec(),
        }
    }
}

impl LevelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.radius == 0 {
            return Err(ConfigError::InvalidLevels("radius must be positive".to_string()));
        }
        if self.max_levels == 0 {
            return Err(ConfigError::InvalidLevels(
                "max_levels must be positive".to_string(),
            ));
        }
        if let Some(bad) = self
            .fibonacci_ratios
            .iter()
            .find(|r| !(r.is_finite() && **r > 0.0 && **r < 1.0))
        {
            return Err(ConfigError::InvalidLevels(format!(
                "fibonacci ratio {} must lie in (0, 1)",
                bad
            )));
        }
        Ok(())
    }
}

/// Minimum separation between two reported levels of the same kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredGap {
    /// Absolute price distance (quote currency)
    Absolute(f64),
    /// Percentage of the current price
    Percent(f64),
    /// Multiple of the latest ATR
    AtrMultiple(f64),
}

impl DesiredGap {
    fn value(&self) -> f64 {
        match *self {
            DesiredGap::Absolute(v) | DesiredGap::Percent(v) | DesiredGap::AtrMultiple(v) => v,
        }
    }

    /// Resolve to an absolute price distance.
    ///
    /// An ATR multiple without an ATR resolves to zero: only identical prices merge.
    pub fn resolve(&self, current_price: f64, atr: Option<f64>) -> f64 {
        match *self {
            DesiredGap::Absolute(gap) => gap,
            DesiredGap::Percent(pct) => current_price.abs() * pct / 100.0,
            DesiredGap::AtrMultiple(mult) => atr.map(|a| a * mult).unwrap_or(0.0),
        }
    }
}

impl Default for DesiredGap {
    fn default() -> Self {
        DesiredGap::Percent(0.5)
    }
}

/// Per-symbol settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolConfig {
    /// Unified symbol, e.g. "BTC/USDT"
    pub symbol: String,
    /// Exchange the OHLCV window is fetched from
    pub exchange: ExchangeId,
    #[serde(default)]
    pub desired_gap: DesiredGap,
}

impl SymbolConfig {
    pub fn new(symbol: impl Into<String>, exchange: ExchangeId, desired_gap: DesiredGap) -> Self {
        SymbolConfig {
            symbol: symbol.into(),
            exchange,
            desired_gap,
        }
    }

    pub fn symbol(&self) -> Symbol {
        Symbol::new(&self.symbol)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let value = self.desired_gap.value();
        if !(value.is_finite() && value > 0.0) {
            return Err(ConfigError::InvalidGap {
                symbol: self.symbol.clone(),
                value,
            });
        }
        Ok(())
    }
}

fn default_symbols() -> Vec<SymbolConfig> {
    vec![
        SymbolConfig::new("BTC/USDT", ExchangeId::Binance, DesiredGap::Absolute(500.0)),
        SymbolConfig::new("ETH/USDT", ExchangeId::Binance, DesiredGap::Percent(0.5)),
        SymbolConfig::new("DOGE/USDT", ExchangeId::Binance, DesiredGap::Percent(0.8)),
        SymbolConfig::new("SUI/USDT", ExchangeId::Binance, DesiredGap::Percent(0.8)),
        SymbolConfig::new("POPCAT/USDT", ExchangeId::Bitget, DesiredGap::AtrMultiple(0.5)),
        SymbolConfig::new("HYPE/USDT", ExchangeId::Bitget, DesiredGap::AtrMultiple(0.5)),
    ]
}
