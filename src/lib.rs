//! DCA Market Dashboard
//!
//! Aggregates OHLCV windows from several exchanges, computes technical
//! indicators and support/resistance levels, and derives a rule-based
//! dollar-cost-averaging recommendation for every configured symbol.
//!
//! The analysis core ([`indicators`], [`levels`], [`dca`]) is pure and
//! deterministic. Fetching, caching and logging live at the edges
//! ([`exchange`], [`data`], [`overview`]).
//!
//! ## Example
//! ```no_run
//! use dca_dashboard::{build_overview, Config, MarketAnalyzer, SourceRegistry};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let analyzer = MarketAnalyzer::from_config(&config)?;
//!     let registry = SourceRegistry::live()?;
//!     for entry in build_overview(&registry, &analyzer, &config.market, &config.symbols) {
//!         println!("{}", serde_json::to_string(&entry)?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod data;
pub mod dca;
pub mod exchange;
pub mod indicators;
pub mod levels;
pub mod overview;
pub mod types;

pub use config::{Config, ConfigError, DesiredGap, SymbolConfig};
pub use dca::{DcaInputs, DcaScorer, DcaSignal, Recommendation, Sentiment};
pub use exchange::{CandleSource, ExchangeId, SourceRegistry};
pub use indicators::{IndicatorSeries, IndicatorSnapshot, VolumeStatus};
pub use levels::{LevelExtractor, LevelSet, PriceLevel};
pub use overview::{build_overview, MarketAnalyzer, MarketOverview, OverviewEntry};
pub use types::*;
