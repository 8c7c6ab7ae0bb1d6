//! Analyze command - score a local CSV window for one symbol

use anyhow::{Context, Result};
use dca_dashboard::data::{candle_file_name, load_csv, validate_candles};
use dca_dashboard::{Config, DesiredGap, MarketAnalyzer, Symbol};
use std::path::PathBuf;
use tracing::{info, warn};

use super::{fmt_opt, price_precision};

pub fn run(
    config: Config,
    symbol: String,
    file: Option<PathBuf>,
    price: Option<f64>,
    json: bool,
) -> Result<()> {
    let symbol = Symbol::new(symbol.trim());
    let path = file.unwrap_or_else(|| {
        PathBuf::from(&config.market.cache_dir)
            .join(candle_file_name(&symbol, &config.market.timeframe))
    });
    info!("Analyzing {} from {}", symbol, path.display());

    let candles = load_csv(&path).with_context(|| format!("Failed to load {}", path.display()))?;
    if candles.is_empty() {
        anyhow::bail!("No candles in {}", path.display());
    }

    let validation = validate_candles(&candles);
    for warning in &validation.warnings {
        warn!("{}", warning);
    }
    if !validation.is_valid() {
        for error in &validation.errors {
            warn!("{}", error);
        }
        anyhow::bail!(
            "{} invalid candles in {}",
            validation.errors.len(),
            path.display()
        );
    }

    let desired_gap = match config.symbol(symbol.as_str()) {
        Some(symbol_config) => symbol_config.desired_gap,
        None => {
            warn!("{} is not configured, using default level gap", symbol);
            DesiredGap::default()
        }
    };

    let analyzer = MarketAnalyzer::from_config(&config)?;
    let overview = match price {
        Some(price) => analyzer.analyze(&symbol, &candles, price, &desired_gap),
        None => analyzer.analyze_window(&symbol, &candles, &desired_gap),
    }
    .context("Nothing to analyze")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }

    let spans = analyzer.indicator_config();
    let ind = &overview.indicators;
    let rec = &overview.recommendation;
    let precision = price_precision(overview.current_price);

    println!("\n{}", "=".repeat(60));
    println!("DCA ANALYSIS: {}", overview.symbol);
    println!("{}", "=".repeat(60));
    println!("Candles:            {}", overview.candle_count);
    println!("Current Price:      {:.*}", precision, overview.current_price);
    println!("EMA({}):            {}", spans.ema_span, fmt_opt(ind.ema, precision));
    println!("SMA({}):            {}", spans.sma_span, fmt_opt(ind.sma, precision));
    println!("RSI({}):            {}", spans.rsi_period, fmt_opt(ind.rsi, 2));
    println!("ATR({}):            {}", spans.atr_period, fmt_opt(ind.atr, precision));
    println!("Volume Ratio:       {}", fmt_opt(ind.volume_ratio, 2));
    println!("Volume Ratio Avg:   {}", fmt_opt(ind.volume_ratio_avg, 2));
    println!("Vol/Price Ratio:    {}", fmt_opt(ind.vol_price_ratio, 2));
    println!(
        "Volume Status:      {}",
        ind.volume_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("{}", "-".repeat(60));
    for level in &overview.levels.support {
        println!("Support:            {:.*} (x{})", precision, level.price, level.strength);
    }
    for level in &overview.levels.resistance {
        println!("Resistance:         {:.*} (x{})", precision, level.price, level.strength);
    }
    println!("{}", "-".repeat(60));
    println!("Signal:             {}", rec.signal);
    println!("Confidence:         {:.1}", rec.confidence);
    println!("Amount Multiplier:  {:.2}", rec.amount_multiplier);
    println!("Sentiment:          {}", rec.sentiment);
    for reason in &rec.reasoning {
        println!("  - {}", reason);
    }
    println!("{}", "=".repeat(60));

    Ok(())
}
