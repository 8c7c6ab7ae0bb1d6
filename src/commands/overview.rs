//! Overview command - analyze every configured symbol

use anyhow::{Context, Result};
use dca_dashboard::levels::PriceLevel;
use dca_dashboard::{build_overview, Config, MarketAnalyzer, MarketOverview, OverviewEntry};
use itertools::Itertools;
use tracing::info;

use super::{build_registry, fmt_opt, price_precision, select_symbols};

pub fn run(config: Config, symbols: Option<String>, json: bool, no_cache: bool) -> Result<()> {
    info!("Starting market overview");

    let selected = select_symbols(&config, symbols.as_deref())?;
    let analyzer = MarketAnalyzer::from_config(&config)?;
    let registry = build_registry(&config, !no_cache)?;
    info!("Exchanges: {:?}", registry.exchanges());

    let entries = build_overview(&registry, &analyzer, &config.market, &selected);

    if json {
        let out = serde_json::to_string_pretty(&entries).context("Failed to serialize overview")?;
        println!("{}", out);
    } else {
        print_table(&config, &entries);
    }

    info!("Overview completed");
    Ok(())
}

fn format_levels(levels: &[PriceLevel], precision: usize) -> String {
    if levels.is_empty() {
        return "-".to_string();
    }
    levels
        .iter()
        .map(|l| format!("{:.*}(x{})", precision, l.price, l.strength))
        .join(", ")
}

fn print_details(overview: &MarketOverview) {
    let precision = price_precision(overview.current_price);
    println!("\n{} @ {:.*}", overview.symbol, precision, overview.current_price);
    println!("  Support:    {}", format_levels(&overview.levels.support, precision));
    println!("  Resistance: {}", format_levels(&overview.levels.resistance, precision));
    for reason in &overview.recommendation.reasoning {
        println!("  - {}", reason);
    }
}

fn print_table(config: &Config, entries: &[OverviewEntry]) {
    println!("\n{}", "=".repeat(100));
    println!(
        "MARKET OVERVIEW ({} bars x {})",
        config.market.limit, config.market.timeframe
    );
    println!("{}", "=".repeat(100));
    println!(
        "{:<14} {:>14} {:>8} {:>8} {:>10} {:>12} {:>6} {:>6} {:>9}",
        "Symbol", "Price", "RSI", "ATR%", "Volume", "Signal", "Conf", "Mult", "Sentiment"
    );
    println!("{}", "-".repeat(100));

    for entry in entries {
        match entry {
            OverviewEntry::Ready(o) => {
                let atr_pct = o
                    .indicators
                    .atr
                    .map(|atr| atr / o.current_price * 100.0);
                println!(
                    "{:<14} {:>14} {:>8} {:>8} {:>10} {:>12} {:>6.1} {:>6.2} {:>9}",
                    o.symbol.as_str(),
                    format!("{:.*}", price_precision(o.current_price), o.current_price),
                    fmt_opt(o.indicators.rsi, 1),
                    fmt_opt(atr_pct, 2),
                    o.indicators
                        .volume_status
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    o.recommendation.signal.as_str(),
                    o.recommendation.confidence,
                    o.recommendation.amount_multiplier,
                    o.recommendation.sentiment.as_str(),
                );
            }
            OverviewEntry::NoData {
                symbol,
                exchange,
                reason,
            } => {
                println!("{:<14} no data from {}: {}", symbol.as_str(), exchange, reason);
            }
        }
    }
    println!("{}", "=".repeat(100));

    for overview in entries.iter().filter_map(OverviewEntry::overview) {
        print_details(overview);
    }
    println!();
}
