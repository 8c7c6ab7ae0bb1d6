//! Data loading and caching
//!
//! Handles CSV candle files, the on-disk OHLCV cache and the two file-backed
//! [`CandleSource`] implementations: [`CsvSource`] for offline analysis and
//! [`CachedSource`] which keeps a rolling window of every live fetch.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::exchange::CandleSource;
use crate::{Candle, Symbol};

// =============================================================================
// CSV Files
// =============================================================================

/// File name for a symbol/timeframe window: `BTC/USDT`, `4h` -> `BTC_USDT_4h.csv`
pub fn candle_file_name(symbol: &Symbol, timeframe: &str) -> String {
    format!("{}_{}.csv", symbol.file_stem(), timeframe)
}

fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    value
        .parse::<DateTime<Utc>>()
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        // bare exchange timestamps in milliseconds
        .or_else(|| value.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis))
}

/// Load OHLCV data from a CSV file with a
/// `datetime,open,high,low,close,volume` header
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path.as_ref()).context("Failed to open CSV file")?;

    let mut candles = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let datetime = parse_datetime(dt_str)
            .with_context(|| format!("Failed to parse datetime: {}", dt_str))?;

        let field = |idx: usize, name: &str| -> Result<f64> {
            record
                .get(idx)
                .with_context(|| format!("Missing {} column", name))?
                .trim()
                .parse()
                .with_context(|| format!("Failed to parse {} in row {}", name, row_idx + 1))
        };

        let open = field(1, "open")?;
        let high = field(2, "high")?;
        let low = field(3, "low")?;
        let close = field(4, "close")?;
        let volume = field(5, "volume")?;

        candles.push(Candle::new_unchecked(datetime, open, high, low, close, volume));
    }

    Ok(candles)
}

/// Write candles to CSV, creating parent directories as needed
pub fn write_csv(path: impl AsRef<Path>, candles: &[Candle]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(["datetime", "open", "high", "low", "close", "volume"])?;
    for candle in candles {
        writer.write_record([
            candle.datetime.to_rfc3339(),
            candle.open.to_string(),
            candle.high.to_string(),
            candle.low.to_string(),
            candle.close.to_string(),
            candle.volume.to_string(),
        ])?;
    }
    writer.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

// =============================================================================
// Data Validation
// =============================================================================

/// Result of data validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate candle data for consistency
pub fn validate_candles(candles: &[Candle]) -> ValidationResult {
    let mut result = ValidationResult::default();

    for (i, candle) in candles.iter().enumerate() {
        if let Err(e) = candle.validate() {
            result.errors.push(format!("Candle {}: {}", i, e));
        }
        if i > 0 && candle.datetime <= candles[i - 1].datetime {
            result.warnings.push(format!("Candle {}: not chronological", i));
        }
    }

    result
}

// =============================================================================
// Local CSV Source
// =============================================================================

/// Reads `{BASE}_{QUOTE}_{timeframe}.csv` files from a directory
#[derive(Debug, Clone)]
pub struct CsvSource {
    data_dir: PathBuf,
}

impl CsvSource {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        CsvSource {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, symbol: &Symbol, timeframe: &str) -> PathBuf {
        self.data_dir.join(candle_file_name(symbol, timeframe))
    }

    /// Any timeframe file for `symbol`; used for the ticker fallback
    fn latest_close(&self, symbol: &Symbol) -> Result<f64> {
        let prefix = format!("{}_", symbol.file_stem());
        let entries = fs::read_dir(&self.data_dir)
            .with_context(|| format!("Failed to read {}", self.data_dir.display()))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".csv"))
            })
            .collect();
        paths.sort();

        for path in paths {
            if let Some(last) = load_csv(&path)?.last() {
                return Ok(last.close);
            }
        }
        anyhow::bail!("No local data for {}", symbol)
    }
}

impl CandleSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch_candles(&self, symbol: &Symbol, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        let path = self.path_for(symbol, timeframe);
        if !path.exists() {
            anyhow::bail!("Data file not found: {}", path.display());
        }

        let mut candles =
            load_csv(&path).with_context(|| format!("Failed to load data for {}", symbol))?;
        candles.sort_by_key(|c| c.datetime);
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        debug!("Loaded {} candles for {} from {}", candles.len(), symbol, path.display());
        Ok(candles)
    }

    fn fetch_price(&self, symbol: &Symbol) -> Result<f64> {
        self.latest_close(symbol)
    }
}

// =============================================================================
// OHLCV Cache
// =============================================================================

/// Per symbol/timeframe CSV cache holding a rolling window of bars
#[derive(Debug, Clone)]
pub struct OhlcvCache {
    dir: PathBuf,
    max_candles: usize,
}

impl OhlcvCache {
    pub fn new(dir: impl AsRef<Path>, max_candles: usize) -> Self {
        OhlcvCache {
            dir: dir.as_ref().to_path_buf(),
            max_candles,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, symbol: &Symbol, timeframe: &str) -> PathBuf {
        self.dir.join(candle_file_name(symbol, timeframe))
    }

    /// Cached bars, or `None` when missing. A file that fails to parse is
    /// deleted and reported as missing.
    pub fn load(&self, symbol: &Symbol, timeframe: &str) -> Option<Vec<Candle>> {
        let path = self.path_for(symbol, timeframe);
        if !path.exists() {
            return None;
        }

        match load_csv(&path) {
            Ok(candles) => Some(candles),
            Err(e) => {
                warn!("Removing corrupt cache file {}: {:#}", path.display(), e);
                if let Err(e) = fs::remove_file(&path) {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
                None
            }
        }
    }

    /// Merge `fresh` into the cached window, persist it and return the result
    pub fn store(&self, symbol: &Symbol, timeframe: &str, fresh: &[Candle]) -> Result<Vec<Candle>> {
        let cached = self.load(symbol, timeframe).unwrap_or_default();
        let merged = merge_candles(cached, fresh, self.max_candles);

        let path = self.path_for(symbol, timeframe);
        write_csv(&path, &merged)
            .with_context(|| format!("Failed to write cache for {}", symbol))?;
        debug!("Cached {} candles for {} at {}", merged.len(), symbol, path.display());
        Ok(merged)
    }
}

/// Merge two windows by timestamp (bars in `fresh` replace cached ones),
/// sorted ascending and truncated to the newest `max_candles`
pub fn merge_candles(cached: Vec<Candle>, fresh: &[Candle], max_candles: usize) -> Vec<Candle> {
    let mut merged: Vec<Candle> = fresh.iter().cloned().chain(cached).collect();
    // stable sort keeps fresh bars ahead of cached duplicates
    merged.sort_by_key(|c| c.datetime);
    merged.dedup_by_key(|c| c.datetime);
    if merged.len() > max_candles {
        merged.drain(..merged.len() - max_candles);
    }
    merged
}

// =============================================================================
// Cached Source
// =============================================================================

/// Wraps a live source: every successful fetch is merged into the on-disk
/// cache. A failed fetch is returned as an error, never served from cache.
pub struct CachedSource<S> {
    inner: S,
    cache: OhlcvCache,
}

impl<S: CandleSource> CachedSource<S> {
    pub fn new(inner: S, cache: OhlcvCache) -> Self {
        CachedSource { inner, cache }
    }

    pub fn cache(&self) -> &OhlcvCache {
        &self.cache
    }
}

impl<S: CandleSource> CandleSource for CachedSource<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fetch_candles(&self, symbol: &Symbol, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        match self.inner.fetch_candles(symbol, timeframe, limit) {
            Ok(fresh) => {
                let mut merged = match self.cache.store(symbol, timeframe, &fresh) {
                    Ok(merged) => merged,
                    Err(e) => {
                        warn!("{:#}", e);
                        return Ok(fresh);
                    }
                };
                if merged.len() > limit {
                    merged.drain(..merged.len() - limit);
                }
                Ok(merged)
            }
            Err(e) => {
                // never serve a stale window
                warn!("{} fetch failed for {}: {:#}", self.inner.name(), symbol, e);
                Err(e)
            }
        }
    }

    fn fetch_price(&self, symbol: &Symbol) -> Result<f64> {
        self.inner.fetch_price(symbol)
    }
}

/// Refresh the cache for one symbol, returning the cached window size
pub fn refresh_cache(
    source: &dyn CandleSource,
    cache: &OhlcvCache,
    symbol: &Symbol,
    timeframe: &str,
    limit: usize,
) -> Result<usize> {
    let fresh = source
        .fetch_candles(symbol, timeframe, limit)
        .with_context(|| format!("Failed to fetch {} from {}", symbol, source.name()))?;
    if fresh.is_empty() {
        anyhow::bail!("No data fetched for {}", symbol);
    }
    let merged = cache.store(symbol, timeframe, &fresh)?;
    info!(
        "Cached {} candles for {} ({} fetched)",
        merged.len(),
        symbol,
        fresh.len()
    );
    Ok(merged.len())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn bars(start: DateTime<Utc>, hours: std::ops::Range<i64>, close: f64) -> Vec<Candle> {
        hours
            .map(|h| {
                Candle::new_unchecked(
                    start + Duration::hours(h),
                    close,
                    close + 1.0,
                    close - 1.0,
                    close,
                    10.0,
                )
            })
            .collect()
    }

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    struct FlakySource {
        candles: Vec<Candle>,
        fail: AtomicBool,
    }

    impl CandleSource for FlakySource {
        fn name(&self) -> &str {
            "flaky"
        }

        fn fetch_candles(&self, _: &Symbol, _: &str, limit: usize) -> Result<Vec<Candle>> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("exchange unavailable");
            }
            let skip = self.candles.len().saturating_sub(limit);
            Ok(self.candles[skip..].to_vec())
        }

        fn fetch_price(&self, _: &Symbol) -> Result<f64> {
            anyhow::bail!("no ticker")
        }
    }

    #[test]
    fn test_csv_roundtrip_preserves_bars() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("BTC_USDT_4h.csv");
        let candles = bars(epoch(), 0..5, 100.5);

        write_csv(&path, &candles).unwrap();
        let loaded = load_csv(&path).unwrap();

        assert_eq!(loaded, candles);
    }

    #[test]
    fn test_load_csv_accepts_naive_and_millis() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(
            &path,
            "datetime,open,high,low,close,volume\n\
             2024-01-01 00:00:00,1,2,0.5,1.5,10\n\
             1704081600000,1.5,2,1,1.8,12\n",
        )
        .unwrap();

        let candles = load_csv(&path).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(
            (candles[1].datetime - candles[0].datetime).num_hours(),
            4
        );
    }

    #[test]
    fn test_merge_fresh_wins_and_truncates() {
        let cached = bars(epoch(), 0..6, 100.0);
        let fresh = bars(epoch(), 4..8, 200.0);

        let merged = merge_candles(cached, &fresh, 5);

        assert_eq!(merged.len(), 5);
        let closes: Vec<f64> = merged.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![100.0, 200.0, 200.0, 200.0, 200.0]);
        assert!(merged.windows(2).all(|w| w[0].datetime < w[1].datetime));
    }

    #[test]
    fn test_corrupt_cache_file_is_removed() {
        let dir = TempDir::new().unwrap();
        let cache = OhlcvCache::new(dir.path(), 100);
        let symbol = Symbol::new("ETH/USDT");
        let path = cache.path_for(&symbol, "4h");
        fs::write(&path, "datetime,open,high,low,close,volume\nnot-a-date,x,y,z,w,v\n").unwrap();

        assert!(cache.load(&symbol, "4h").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_cached_source_fetch_failure_is_an_error() {
        let dir = TempDir::new().unwrap();
        let symbol = Symbol::new("SUI/USDT");
        let source = CachedSource::new(
            FlakySource {
                candles: bars(epoch(), 0..30, 3.0),
                fail: AtomicBool::new(false),
            },
            OhlcvCache::new(dir.path(), 3000),
        );

        let live = source.fetch_candles(&symbol, "4h", 20).unwrap();
        assert_eq!(live.len(), 20);
        let path = source.cache().path_for(&symbol, "4h");
        assert!(path.exists());

        source.inner.fail.store(true, Ordering::SeqCst);
        let err = source.fetch_candles(&symbol, "4h", 10).unwrap_err();
        assert!(err.to_string().contains("exchange unavailable"));

        // cached window survives for the next successful refresh
        assert_eq!(source.cache().load(&symbol, "4h").unwrap(), live);
        assert!(path.exists());
    }

    #[test]
    fn test_cached_source_without_cache_propagates_error() {
        let dir = TempDir::new().unwrap();
        let source = CachedSource::new(
            FlakySource {
                candles: vec![],
                fail: AtomicBool::new(true),
            },
            OhlcvCache::new(dir.path(), 3000),
        );
        assert!(source
            .fetch_candles(&Symbol::new("DOGE/USDT"), "4h", 10)
            .is_err());
    }

    #[test]
    fn test_csv_source_reads_window_and_price() {
        let dir = TempDir::new().unwrap();
        let symbol = Symbol::new("POPCAT/USDT");
        let source = CsvSource::new(dir.path());
        write_csv(source.path_for(&symbol, "4h"), &bars(epoch(), 0..50, 0.4)).unwrap();

        let window = source.fetch_candles(&symbol, "4h", 20).unwrap();
        assert_eq!(window.len(), 20);
        assert_eq!(source.fetch_price(&symbol).unwrap(), 0.4);
        assert!(source.fetch_candles(&symbol, "1h", 20).is_err());
    }

    #[test]
    fn test_validate_candles() {
        let mut candles = bars(epoch(), 0..3, 10.0);
        assert!(validate_candles(&candles).is_valid());

        candles[1].high = 5.0;
        candles.swap(0, 2);
        let result = validate_candles(&candles);
        assert!(!result.is_valid());
        assert!(!result.warnings.is_empty());
    }
}
