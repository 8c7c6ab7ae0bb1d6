//! Support and resistance level extraction
//!
//! Levels come from local price extrema: a bar whose high (low) dominates a
//! symmetric neighborhood of bars. Extrema closer together than the symbol's
//! desired gap collapse into one level whose strength counts the touches.
//! When a side has fewer levels than requested, Fibonacci retracements of the
//! window range fill the remaining slots without ever displacing an extremum.

use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::config::{ConfigError, LevelConfig};
use crate::Candle;

/// Default retracement ratios used for backfilling
pub const FIBONACCI_RATIOS: [f64; 5] = [0.236, 0.382, 0.5, 0.618, 0.786];

/// Strength given to a Fibonacci backfill level
pub const FIBONACCI_STRENGTH: u32 = 1;

/// Which side of the market a level sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    Support,
    Resistance,
}

/// Where a level came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelSource {
    /// Local high/low in the window
    Extremum,
    /// Retracement of the window range
    Fibonacci,
}

/// A price level; serializes as `{ "level", "strength", "source" }`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceLevel {
    #[serde(rename = "level")]
    pub price: f64,
    #[serde(skip)]
    pub kind: LevelKind,
    pub strength: u32,
    pub source: LevelSource,
}

impl PriceLevel {
    pub fn new(price: f64, kind: LevelKind, strength: u32, source: LevelSource) -> Self {
        PriceLevel {
            price,
            kind,
            strength,
            source,
        }
    }

    /// Distance to `price` as a percentage of `price`
    pub fn distance_pct(&self, price: f64) -> f64 {
        if price == 0.0 {
            return f64::INFINITY;
        }
        (price - self.price).abs() / price.abs() * 100.0
    }
}

/// Support and resistance levels, each nearest to the current price first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LevelSet {
    pub support: Vec<PriceLevel>,
    pub resistance: Vec<PriceLevel>,
}

impl LevelSet {
    pub fn is_empty(&self) -> bool {
        self.support.is_empty() && self.resistance.is_empty()
    }

    fn side_mut(&mut self, kind: LevelKind) -> &mut Vec<PriceLevel> {
        match kind {
            LevelKind::Support => &mut self.support,
            LevelKind::Resistance => &mut self.resistance,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Extremum {
    Max,
    Min,
}

/// Extracts ranked support/resistance levels from a candle window
#[derive(Debug, Clone)]
pub struct LevelExtractor {
    config: LevelConfig,
}

impl Default for LevelExtractor {
    fn default() -> Self {
        LevelExtractor {
            config: LevelConfig::default(),
        }
    }
}

impl LevelExtractor {
    pub fn new(config: LevelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(LevelExtractor { config })
    }

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    /// Extract levels around `current_price`, merging levels closer than `gap`
    pub fn extract(&self, candles: &[Candle], current_price: f64, gap: f64) -> LevelSet {
        if candles.is_empty() {
            return LevelSet::default();
        }

        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let max = self.config.max_levels;

        let mut levels = LevelSet {
            support: merge_candidates(
                local_extrema(&lows, self.config.radius, Extremum::Min),
                LevelKind::Support,
                current_price,
                gap,
                max,
            ),
            resistance: merge_candidates(
                local_extrema(&highs, self.config.radius, Extremum::Max),
                LevelKind::Resistance,
                current_price,
                gap,
                max,
            ),
        };

        if levels.support.len() < max || levels.resistance.len() < max {
            let window_high = highs.iter().copied().fold(f64::MIN, f64::max);
            let window_low = lows.iter().copied().fold(f64::MAX, f64::min);
            self.backfill_fibonacci(&mut levels, window_high, window_low, current_price, gap);
        }

        levels
    }

    fn backfill_fibonacci(
        &self,
        levels: &mut LevelSet,
        window_high: f64,
        window_low: f64,
        current_price: f64,
        gap: f64,
    ) {
        let range = window_high - window_low;
        if range <= 0.0 {
            return;
        }

        let max = self.config.max_levels;
        let candidates = self
            .config
            .fibonacci_ratios
            .iter()
            .map(|ratio| window_high - range * ratio)
            .sorted_by_key(|&price| proximity_key(price, current_price));

        for price in candidates {
            let kind = if price <= current_price {
                LevelKind::Support
            } else {
                LevelKind::Resistance
            };

            let crowded = levels
                .support
                .iter()
                .chain(levels.resistance.iter())
                .any(|l| within_gap(l.price, price, gap));
            let side = levels.side_mut(kind);
            if crowded || side.len() >= max {
                continue;
            }

            side.push(PriceLevel::new(
                price,
                kind,
                FIBONACCI_STRENGTH,
                LevelSource::Fibonacci,
            ));
        }

        for side in [&mut levels.support, &mut levels.resistance] {
            side.sort_by_key(|l| proximity_key(l.price, current_price));
        }
    }
}

fn proximity_key(price: f64, current_price: f64) -> (OrderedFloat<f64>, OrderedFloat<f64>) {
    (
        OrderedFloat((price - current_price).abs()),
        OrderedFloat(price),
    )
}

fn within_gap(a: f64, b: f64, gap: f64) -> bool {
    let diff = (a - b).abs();
    diff == 0.0 || diff < gap
}

/// Values that strictly dominate every neighbor within `radius` bars.
/// Bars without a full neighborhood on both sides are skipped.
fn local_extrema(values: &[f64], radius: usize, pick: Extremum) -> Vec<f64> {
    if radius == 0 || values.len() < 2 * radius + 1 {
        return vec![];
    }

    (radius..values.len() - radius)
        .filter(|&i| {
            let value = values[i];
            values[i - radius..=i + radius]
                .iter()
                .enumerate()
                .filter(|&(offset, _)| offset != radius)
                .all(|(_, &other)| match pick {
                    Extremum::Max => value > other,
                    Extremum::Min => value < other,
                })
        })
        .map(|i| values[i])
        .collect()
}

/// Nearest-first merge: a candidate within `gap` of an accepted level bumps
/// that level's strength instead of adding a new one.
fn merge_candidates(
    candidates: Vec<f64>,
    kind: LevelKind,
    current_price: f64,
    gap: f64,
    max_levels: usize,
) -> Vec<PriceLevel> {
    let mut accepted: Vec<PriceLevel> = Vec::new();

    for price in candidates
        .into_iter()
        .sorted_by_key(|&p| proximity_key(p, current_price))
    {
        match accepted.iter_mut().find(|l| within_gap(l.price, price, gap)) {
            Some(level) => level.strength += 1,
            None => accepted.push(PriceLevel::new(price, kind, 1, LevelSource::Extremum)),
        }
    }

    accepted.truncate(max_levels);
    accepted
}
