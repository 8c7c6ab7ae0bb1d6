//! Subcommand implementations

pub mod analyze;
pub mod download;
pub mod overview;

use anyhow::Result;
use dca_dashboard::data::{CachedSource, CsvSource, OhlcvCache};
use dca_dashboard::{CandleSource, Config, ExchangeId, SourceRegistry, SymbolConfig};
use tracing::info;

/// Configured symbols, optionally narrowed by a comma-separated filter
pub fn select_symbols(config: &Config, filter: Option<&str>) -> Result<Vec<SymbolConfig>> {
    let Some(filter) = filter else {
        return Ok(config.symbols.clone());
    };

    filter
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| {
            config
                .symbol(name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Symbol {} is not configured", name))
        })
        .collect()
}

/// Live adapters plus a CSV source over the cache directory. With
/// `use_cache`, successful live fetches are merged into the cache.
pub fn build_registry(config: &Config, use_cache: bool) -> Result<SourceRegistry> {
    let cache = OhlcvCache::new(&config.market.cache_dir, config.market.max_cached_candles);
    let mut registry = SourceRegistry::live()?;

    if use_cache {
        info!("Using OHLCV cache at {}", cache.dir().display());
        registry = registry.map_sources(|_, source| -> Box<dyn CandleSource> {
            Box::new(CachedSource::new(source, cache.clone()))
        });
    }

    registry.register(ExchangeId::Csv, CsvSource::new(&config.market.cache_dir));
    Ok(registry)
}

/// `12.3456` with `precision` decimals, `-` when unavailable
pub fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_else(|| "-".to_string())
}

/// Decimals that keep a few significant digits for cheap coins
pub fn price_precision(price: f64) -> usize {
    match price.abs() {
        p if p >= 1000.0 => 2,
        p if p >= 1.0 => 4,
        _ => 6,
    }
}
