//! Market overview assembly
//!
//! [`MarketAnalyzer`] runs the pure pipeline for one candle window:
//! indicators, then levels, then the DCA scorer. [`build_overview`] fans the
//! configured symbols out over the rayon pool, fetches each window from its
//! exchange adapter and turns every failure into an explicit no-data entry.

use rayon::prelude::*;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{
    Config, ConfigError, DesiredGap, IndicatorConfig, LevelConfig, MarketConfig, SymbolConfig,
};
use crate::data::validate_candles;
use crate::dca::{DcaInputs, DcaScorer, Recommendation};
use crate::exchange::{ExchangeId, SourceRegistry};
use crate::indicators::{IndicatorSeries, IndicatorSnapshot};
use crate::levels::{LevelExtractor, LevelSet};
use crate::{Candle, Symbol};

/// Where `current_price` came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Ticker,
    LastClose,
}

/// Analysis result for one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct MarketOverview {
    pub symbol: Symbol,
    pub current_price: f64,
    pub price_source: PriceSource,
    pub candle_count: usize,
    /// Spans the indicator keys are named after
    pub spans: IndicatorConfig,
    pub indicators: IndicatorSnapshot,
    pub levels: LevelSet,
    pub recommendation: Recommendation,
}

impl Serialize for MarketOverview {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let ind = &self.indicators;
        let rec = &self.recommendation;

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("symbol", &self.symbol)?;
        map.serialize_entry("current_price", &self.current_price)?;
        map.serialize_entry("price_source", &self.price_source)?;
        map.serialize_entry("candle_count", &self.candle_count)?;
        map.serialize_entry(&format!("ema_{}", self.spans.ema_span), &ind.ema)?;
        map.serialize_entry(&format!("sma_{}", self.spans.sma_span), &ind.sma)?;
        map.serialize_entry(&format!("atr_{}", self.spans.atr_period), &ind.atr)?;
        map.serialize_entry(&format!("rsi_{}", self.spans.rsi_period), &ind.rsi)?;
        map.serialize_entry("volume_ratio", &ind.volume_ratio)?;
        map.serialize_entry("volume_ratio_avg", &ind.volume_ratio_avg)?;
        map.serialize_entry("vol_price_ratio", &ind.vol_price_ratio)?;
        map.serialize_entry("price_change_pct", &ind.price_change_pct)?;
        map.serialize_entry("volume_status", &ind.volume_status)?;
        map.serialize_entry("support_levels", &self.levels.support)?;
        map.serialize_entry("resistance_levels", &self.levels.resistance)?;
        map.serialize_entry("dca_signal", &rec.signal)?;
        map.serialize_entry("dca_confidence", &rec.confidence)?;
        map.serialize_entry("dca_amount_multiplier", &rec.amount_multiplier)?;
        map.serialize_entry("market_sentiment", &rec.sentiment)?;
        map.serialize_entry("dca_reasoning", &rec.reasoning)?;
        map.end()
    }
}

/// One row of the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OverviewEntry {
    Ready(MarketOverview),
    NoData {
        symbol: Symbol,
        exchange: ExchangeId,
        reason: String,
    },
}

impl OverviewEntry {
    pub fn symbol(&self) -> &Symbol {
        match self {
            OverviewEntry::Ready(overview) => &overview.symbol,
            OverviewEntry::NoData { symbol, .. } => symbol,
        }
    }

    pub fn overview(&self) -> Option<&MarketOverview> {
        match self {
            OverviewEntry::Ready(overview) => Some(overview),
            OverviewEntry::NoData { .. } => None,
        }
    }
}

// =============================================================================
// Analyzer
// =============================================================================

/// Indicators, levels and scoring for a single window
#[derive(Debug)]
pub struct MarketAnalyzer {
    indicators: IndicatorConfig,
    extractor: LevelExtractor,
    scorer: DcaScorer,
}

impl MarketAnalyzer {
    pub fn new(indicators: IndicatorConfig, levels: LevelConfig) -> Result<Self, ConfigError> {
        indicators.validate()?;
        Ok(MarketAnalyzer {
            indicators,
            extractor: LevelExtractor::new(levels)?,
            scorer: DcaScorer::new(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(config.indicators.clone(), config.levels.clone())
    }

    /// Replace the rule battery
    pub fn with_scorer(mut self, scorer: DcaScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn indicator_config(&self) -> &IndicatorConfig {
        &self.indicators
    }

    /// Analyze a window priced at `current_price`; `None` for an empty window
    pub fn analyze(
        &self,
        symbol: &Symbol,
        candles: &[Candle],
        current_price: f64,
        desired_gap: &DesiredGap,
    ) -> Option<MarketOverview> {
        if candles.is_empty() {
            return None;
        }

        let indicators = IndicatorSeries::compute(candles, &self.indicators).latest();
        let gap = desired_gap.resolve(current_price, indicators.atr);
        let levels = self.extractor.extract(candles, current_price, gap);
        let inputs = DcaInputs::from_snapshot(current_price, &indicators, &levels.support);
        let recommendation = self.scorer.score(&inputs);

        Some(MarketOverview {
            symbol: symbol.clone(),
            current_price,
            price_source: PriceSource::Ticker,
            candle_count: candles.len(),
            spans: self.indicators.clone(),
            indicators,
            levels,
            recommendation,
        })
    }

    /// Analyze a window priced at its own last close
    pub fn analyze_window(
        &self,
        symbol: &Symbol,
        candles: &[Candle],
        desired_gap: &DesiredGap,
    ) -> Option<MarketOverview> {
        let last_close = candles.last()?.close;
        self.analyze(symbol, candles, last_close, desired_gap)
            .map(|overview| MarketOverview {
                price_source: PriceSource::LastClose,
                ..overview
            })
    }
}

// =============================================================================
// Assembler
// =============================================================================

fn no_data(symbol_config: &SymbolConfig, reason: impl Into<String>) -> OverviewEntry {
    OverviewEntry::NoData {
        symbol: symbol_config.symbol(),
        exchange: symbol_config.exchange,
        reason: reason.into(),
    }
}

/// Fetch and analyze one configured symbol. A failed fetch, an empty window
/// or a window with invalid candles is reported as no data, never scored.
pub fn overview_for(
    registry: &SourceRegistry,
    analyzer: &MarketAnalyzer,
    market: &MarketConfig,
    symbol_config: &SymbolConfig,
) -> OverviewEntry {
    let symbol = symbol_config.symbol();
    let Some(source) = registry.get(symbol_config.exchange) else {
        warn!("No adapter registered for {} ({})", symbol, symbol_config.exchange);
        return no_data(
            symbol_config,
            format!("no adapter registered for {}", symbol_config.exchange),
        );
    };

    let candles = match source.fetch_candles(&symbol, &market.timeframe, market.limit) {
        Ok(candles) => candles,
        Err(e) => {
            warn!("Failed to fetch {} from {}: {:#}", symbol, source.name(), e);
            return no_data(symbol_config, format!("fetch failed: {:#}", e));
        }
    };

    let Some(last) = candles.last() else {
        warn!("Empty OHLCV window for {}", symbol);
        return no_data(symbol_config, "empty OHLCV window");
    };

    let validation = validate_candles(&candles);
    if !validation.is_valid() {
        warn!(
            "Rejecting OHLCV window for {} from {}: {} invalid candles",
            symbol,
            source.name(),
            validation.errors.len()
        );
        return no_data(
            symbol_config,
            format!("invalid OHLCV window: {}", validation.errors.join("; ")),
        );
    }

    let (current_price, price_source) = match source.fetch_price(&symbol) {
        Ok(price) if price.is_finite() && price > 0.0 => (price, PriceSource::Ticker),
        Ok(price) => {
            warn!("Invalid ticker price {} for {}, using last close", price, symbol);
            (last.close, PriceSource::LastClose)
        }
        Err(e) => {
            warn!("Ticker unavailable for {}, using last close: {:#}", symbol, e);
            (last.close, PriceSource::LastClose)
        }
    };

    match analyzer.analyze(&symbol, &candles, current_price, &symbol_config.desired_gap) {
        Some(overview) => {
            debug!(
                "{}: price={} signal={} confidence={:.1}",
                symbol,
                current_price,
                overview.recommendation.signal,
                overview.recommendation.confidence
            );
            OverviewEntry::Ready(MarketOverview {
                price_source,
                ..overview
            })
        }
        None => no_data(symbol_config, "empty OHLCV window"),
    }
}

/// Build the dashboard for every configured symbol, in configuration order
pub fn build_overview(
    registry: &SourceRegistry,
    analyzer: &MarketAnalyzer,
    market: &MarketConfig,
    symbols: &[SymbolConfig],
) -> Vec<OverviewEntry> {
    info!(
        "Building overview for {} symbols ({} x {})",
        symbols.len(),
        market.timeframe,
        market.limit
    );

    let entries: Vec<OverviewEntry> = symbols
        .par_iter()
        .map(|symbol_config| overview_for(registry, analyzer, market, symbol_config))
        .collect();

    let ready = entries.iter().filter(|e| e.overview().is_some()).count();
    info!("Overview complete: {} ready, {} without data", ready, entries.len() - ready);
    entries
}
