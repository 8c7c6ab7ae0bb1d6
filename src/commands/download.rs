//! Download command - refresh the OHLCV cache from the exchanges

use anyhow::Result;
use dca_dashboard::data::{refresh_cache, OhlcvCache};
use dca_dashboard::{Config, ExchangeId, SourceRegistry};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{info, warn};

pub fn run(config: Config, timeframe: Option<String>, limit: Option<usize>) -> Result<()> {
    let timeframe = timeframe.unwrap_or_else(|| config.market.timeframe.clone());
    let limit = limit.unwrap_or(config.market.limit);
    info!("Starting cache refresh: {} x {}", timeframe, limit);

    let registry = SourceRegistry::live()?;
    let cache = OhlcvCache::new(&config.market.cache_dir, config.market.max_cached_candles);
    let symbols: Vec<_> = config
        .symbols
        .iter()
        .filter(|s| s.exchange != ExchangeId::Csv)
        .collect();

    println!("\n{}", "=".repeat(60));
    println!("REFRESHING OHLCV CACHE");
    println!("{}", "=".repeat(60));
    println!("  Symbols:    {}", symbols.len());
    println!("  Timeframe:  {}", timeframe);
    println!("  Limit:      {}", limit);
    println!("  Cache dir:  {}", cache.dir().display());
    println!("{}\n", "=".repeat(60));

    let pb = ProgressBar::new(symbols.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("⚡ {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}] {msg}")?
            .progress_chars("█░ "),
    );
    pb.set_message("starting...");
    pb.tick();

    let results: Vec<(String, Result<usize>)> = symbols
        .par_iter()
        .map(|symbol_config| {
            let symbol = symbol_config.symbol();
            let result = match registry.get(symbol_config.exchange) {
                Some(source) => refresh_cache(source, &cache, &symbol, &timeframe, limit),
                None => Err(anyhow::anyhow!(
                    "no adapter registered for {}",
                    symbol_config.exchange
                )),
            };
            pb.set_message(symbol.to_string());
            pb.inc(1);
            (symbol.to_string(), result)
        })
        .collect();
    pb.finish_with_message("done");

    let mut success_count = 0;
    let mut total_candles = 0;
    println!();
    for (symbol, result) in &results {
        match result {
            Ok(count) => {
                success_count += 1;
                total_candles += count;
                println!("  ✓ {:<14} {} candles", symbol, count);
            }
            Err(e) => {
                warn!("Refresh failed for {}: {:#}", symbol, e);
                println!("  ✗ {:<14} {:#}", symbol, e);
            }
        }
    }

    println!("\n{}", "=".repeat(60));
    println!("REFRESH COMPLETE");
    println!("{}", "=".repeat(60));
    println!("  Successful: {}/{}", success_count, results.len());
    println!("  Total candles cached: {}", total_candles);
    println!("{}", "=".repeat(60));

    Ok(())
}
