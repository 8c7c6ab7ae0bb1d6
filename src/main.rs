//! DCA dashboard - main entry point
//!
//! This binary provides three subcommands:
//! - overview: Fetch and analyze every configured symbol
//! - analyze: Analyze a local CSV window for one symbol
//! - download: Refresh the OHLCV cache from the exchanges

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "dca-dashboard")]
#[command(about = "Crypto market overview with indicators, support/resistance and DCA signals", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (built-in defaults when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch and analyze all configured symbols
    Overview {
        /// Only these symbols (comma-separated). E.g., "BTC/USDT,ETH/USDT"
        #[arg(short, long)]
        symbols: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Skip the on-disk OHLCV cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Analyze a local CSV file for one symbol
    Analyze {
        /// Symbol, e.g. "BTC/USDT"
        #[arg(short, long)]
        symbol: String,

        /// CSV file (defaults to the cached window for the symbol)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Price to score against (defaults to the last close)
        #[arg(long)]
        price: Option<f64>,

        /// Print JSON instead of a report
        #[arg(long)]
        json: bool,
    },

    /// Refresh the OHLCV cache for all configured symbols
    Download {
        /// Timeframe override (defaults to market.timeframe)
        #[arg(short, long)]
        timeframe: Option<String>,

        /// Bars to request per symbol (defaults to market.limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn setup_logging(
    log_dir: &Path,
    verbose: bool,
    command_name: &str,
    file_only: bool,
) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = log_dir.join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never(log_dir, &log_filename);

    if file_only {
        // keep stdout clean for JSON output and progress bars
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();
    }

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());
    Ok(log_path)
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Overview { json, .. } => ("overview", *json),
        Commands::Analyze { json, .. } => ("analyze", *json),
        Commands::Download { .. } => ("download", true),
    };

    setup_logging(Path::new("logs"), cli.verbose, command_name, file_only)?;

    let config = dca_dashboard::Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Overview {
            symbols,
            json,
            no_cache,
        } => commands::overview::run(config, symbols, json, no_cache),

        Commands::Analyze {
            symbol,
            file,
            price,
            json,
        } => commands::analyze::run(config, symbol, file, price, json),

        Commands::Download { timeframe, limit } => {
            commands::download::run(config, timeframe, limit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_setup_logging_writes_console_and_file() {
        let dir = TempDir::new().unwrap();
        let log_path = setup_logging(dir.path(), false, "overview", false).unwrap();

        assert!(log_path.starts_with(dir.path()));
        let name = log_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("overview_"));
        assert!(name.ends_with(".log"));

        assert!(log_path.exists());
    }
}
