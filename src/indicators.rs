//! Technical indicators
//!
//! Every function returns a series aligned bar-for-bar with its input. Bars
//! without enough history are `None`, never zero, so callers can tell an
//! unavailable indicator apart from a real reading.
//!
//! Available indicators:
//! - Moving Averages: SMA (via the `ta` crate), EMA
//! - Momentum: RSI (Wilder)
//! - Volatility: True Range, ATR (Wilder), ATR percent
//! - Volume: volume EMA baseline, volume ratio, rolling ratio average,
//!   volume/price ratio, categorical volume status

use serde::{Deserialize, Serialize};
use ta::indicators::SimpleMovingAverage;
use ta::Next;

use crate::config::IndicatorConfig;
use crate::{Candle, OhlcvColumns};

// =============================================================================
// Moving Averages
// =============================================================================

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    let mut result = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let sma_val = indicator.next(value);
        if i + 1 >= period {
            result.push(Some(sma_val));
        } else {
            result.push(None);
        }
    }

    result
}

/// Calculate Exponential Moving Average
///
/// Seeded with the SMA of the first `period` values, then smoothed with
/// multiplier `2 / (period + 1)`.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; values.len()];

    if period == 0 || values.len() < period {
        return result;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema_value = values[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = Some(ema_value);

    for (i, &value) in values.iter().enumerate().skip(period) {
        ema_value = value * multiplier + ema_value * (1.0 - multiplier);
        result[i] = Some(ema_value);
    }

    result
}

/// Apply Wilder's smoothing to a series
/// Wilder's smoothing: new_value = (prev_value * (period - 1) + current) / period
fn wilders_smooth(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; values.len()];

    if period == 0 || values.len() < period {
        return result;
    }

    let mut smoothed = values[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = Some(smoothed);

    for (i, &value) in values.iter().enumerate().skip(period) {
        smoothed = (smoothed * (period - 1) as f64 + value) / period as f64;
        result[i] = Some(smoothed);
    }

    result
}

// =============================================================================
// Volatility Indicators
// =============================================================================

/// Calculate True Range
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        let tr_value = if i == 0 {
            high[i] - low[i]
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(tr_value);
    }

    tr
}

/// Calculate Average True Range (ATR) using Wilder's smoothing
///
/// ATR = (prev_ATR * (period - 1) + current_TR) / period, seeded with the SMA
/// of the first `period` true ranges.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if high.len() != low.len() || high.len() != close.len() {
        return vec![None; close.len()];
    }

    wilders_smooth(&true_range(high, low, close), period)
}

/// ATR as a percentage of price
pub fn atr_percent(atr: f64, price: f64) -> Option<f64> {
    if price > 0.0 {
        Some(atr / price * 100.0)
    } else {
        None
    }
}

// =============================================================================
// Momentum Indicators
// =============================================================================

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - (100.0 / (1.0 + rs))
    }
}

/// Calculate RSI (Relative Strength Index) with Wilder's smoothing
///
/// Needs `period + 1` values: the first reading lands at index `period`.
/// A flat window reads 50, a window with gains and no losses reads 100.
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; values.len()];

    if period == 0 || values.len() <= period {
        return result;
    }

    let changes: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = changes[..period].iter().map(|c| c.max(0.0)).sum::<f64>() / period as f64;
    let mut avg_loss =
        changes[..period].iter().map(|c| (-c).max(0.0)).sum::<f64>() / period as f64;
    result[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    for (j, &change) in changes.iter().enumerate().skip(period) {
        avg_gain = (avg_gain * (period - 1) as f64 + change.max(0.0)) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + (-change).max(0.0)) / period as f64;
        result[j + 1] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    result
}

/// Bar-over-bar close change in percent
pub fn pct_change(values: &[f64]) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        if i == 0 || values[i - 1] == 0.0 {
            result.push(None);
        } else {
            result.push(Some((values[i] / values[i - 1] - 1.0) * 100.0));
        }
    }

    result
}

// =============================================================================
// Volume Indicators
// =============================================================================

/// Current volume relative to its smoothed baseline
pub fn volume_ratio(volume: &[f64], baseline: &[Option<f64>]) -> Vec<Option<f64>> {
    volume
        .iter()
        .zip(baseline.iter())
        .map(|(&v, base)| match base {
            Some(b) if *b > 0.0 => Some(v / b),
            _ => None,
        })
        .collect()
}

/// Rolling mean over an optional series; defined only when the whole window is
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; values.len()];

    if window == 0 {
        return result;
    }

    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().all(Option::is_some) {
            let sum: f64 = slice.iter().flatten().sum();
            result[i] = Some(sum / window as f64);
        }
    }

    result
}

/// Volume ratio weighted by the absolute percent price move of the same bar
pub fn vol_price_ratio(
    volume_ratio: &[Option<f64>],
    price_change_pct: &[Option<f64>],
) -> Vec<Option<f64>> {
    volume_ratio
        .iter()
        .zip(price_change_pct.iter())
        .map(|(ratio, change)| match (ratio, change) {
            (Some(r), Some(c)) => Some(r * c.abs()),
            _ => None,
        })
        .collect()
}

/// Categorical volume level derived from the volume ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeStatus {
    /// Ratio above 2.0
    VeryHigh,
    /// Ratio above 1.2
    High,
    /// Ratio between 0.5 and 1.2
    Normal,
    /// Ratio below 0.5
    Low,
}

impl VolumeStatus {
    pub const VERY_HIGH_THRESHOLD: f64 = 2.0;
    pub const HIGH_THRESHOLD: f64 = 1.2;
    pub const LOW_THRESHOLD: f64 = 0.5;

    pub fn classify(volume_ratio: f64) -> Self {
        if volume_ratio > Self::VERY_HIGH_THRESHOLD {
            VolumeStatus::VeryHigh
        } else if volume_ratio > Self::HIGH_THRESHOLD {
            VolumeStatus::High
        } else if volume_ratio < Self::LOW_THRESHOLD {
            VolumeStatus::Low
        } else {
            VolumeStatus::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeStatus::VeryHigh => "very_high",
            VolumeStatus::High => "high",
            VolumeStatus::Normal => "normal",
            VolumeStatus::Low => "low",
        }
    }
}

impl std::fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Indicator Series / Snapshot
// =============================================================================

/// All indicator series for one candle window, aligned to the candles
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSeries {
    pub ema: Vec<Option<f64>>,
    pub sma: Vec<Option<f64>>,
    pub rsi: Vec<Option<f64>>,
    pub atr: Vec<Option<f64>>,
    pub volume_ema: Vec<Option<f64>>,
    pub volume_ratio: Vec<Option<f64>>,
    pub volume_ratio_avg: Vec<Option<f64>>,
    pub price_change_pct: Vec<Option<f64>>,
    pub vol_price_ratio: Vec<Option<f64>>,
}

impl IndicatorSeries {
    /// Compute every indicator over the window
    pub fn compute(candles: &[Candle], config: &IndicatorConfig) -> Self {
        let cols = OhlcvColumns::from_candles(candles);

        let volume_ema = ema(&cols.volume, config.volume_ema_span);
        let volume_ratio = volume_ratio(&cols.volume, &volume_ema);
        let volume_ratio_avg = rolling_mean(&volume_ratio, config.volume_avg_window);
        let price_change_pct = pct_change(&cols.close);
        let vol_price_ratio = vol_price_ratio(&volume_ratio, &price_change_pct);

        IndicatorSeries {
            ema: ema(&cols.close, config.ema_span),
            sma: sma(&cols.close, config.sma_span),
            rsi: rsi(&cols.close, config.rsi_period),
            atr: atr(&cols.high, &cols.low, &cols.close, config.atr_period),
            volume_ema,
            volume_ratio,
            volume_ratio_avg,
            price_change_pct,
            vol_price_ratio,
        }
    }

    pub fn len(&self) -> usize {
        self.ema.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ema.is_empty()
    }

    /// Latest value of every indicator
    pub fn latest(&self) -> IndicatorSnapshot {
        let volume_ratio = last(&self.volume_ratio);

        IndicatorSnapshot {
            ema: last(&self.ema),
            sma: last(&self.sma),
            rsi: last(&self.rsi),
            atr: last(&self.atr),
            volume_ratio,
            volume_ratio_avg: last(&self.volume_ratio_avg),
            vol_price_ratio: last(&self.vol_price_ratio),
            price_change_pct: last(&self.price_change_pct),
            volume_status: volume_ratio.map(VolumeStatus::classify),
        }
    }
}

fn last(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}

/// Latest indicator readings; `None` means unavailable
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IndicatorSnapshot {
    pub ema: Option<f64>,
    pub sma: Option<f64>,
    pub rsi: Option<f64>,
    pub atr: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub volume_ratio_avg: Option<f64>,
    pub vol_price_ratio: Option<f64>,
    pub price_change_pct: Option<f64>,
    pub volume_status: Option<VolumeStatus>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sma() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_relative_eq!(result[2].unwrap(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(result[3].unwrap(), 3.0, epsilon = 1e-9);
        assert_relative_eq!(result[4].unwrap(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_sma_zero_period_is_unavailable() {
        let result = sma(&[1.0, 2.0], 0);
        assert_eq!(result, vec![None, None]);
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = ema(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_relative_eq!(result[2].unwrap(), 2.0, epsilon = 1e-12);
        // multiplier = 0.5
        assert_relative_eq!(result[3].unwrap(), 3.0, epsilon = 1e-12);
        assert_relative_eq!(result[4].unwrap(), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ema_matches_recursive_definition() {
        let values = vec![10.0, 11.0, 9.5, 12.0, 12.5, 11.0, 13.0];
        let period = 4;
        let result = ema(&values, period);

        let k = 2.0 / (period as f64 + 1.0);
        let mut expected = values[..period].iter().sum::<f64>() / period as f64;
        for i in period..values.len() {
            expected = values[i] * k + expected * (1.0 - k);
            assert_relative_eq!(result[i].unwrap(), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_span_one_equals_close() {
        let values = vec![3.5, 7.25, 1.125, 9.0];
        let ema1 = ema(&values, 1);
        let sma1 = sma(&values, 1);

        for (i, &v) in values.iter().enumerate() {
            assert_relative_eq!(ema1[i].unwrap(), v, epsilon = 1e-12);
            assert_relative_eq!(sma1[i].unwrap(), v, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_short_window_is_unavailable() {
        let values = vec![1.0, 2.0, 3.0];
        assert!(ema(&values, 5).iter().all(Option::is_none));
        assert!(sma(&values, 5).iter().all(Option::is_none));
        assert!(rsi(&values, 14).iter().all(Option::is_none));
        assert_eq!(ema(&values, 5).len(), 3);
    }

    #[test]
    fn test_rsi_rising_series() {
        let values: Vec<f64> = (0..30).map(|x| 100.0 + x as f64).collect();
        let result = rsi(&values, 14);

        assert_eq!(result[13], None);
        assert_relative_eq!(result[14].unwrap(), 100.0);
        assert_relative_eq!(result.last().unwrap().unwrap(), 100.0);
    }

    #[test]
    fn test_rsi_falling_series() {
        let values: Vec<f64> = (0..30).map(|x| 100.0 - x as f64).collect();
        let result = rsi(&values, 14);

        assert_relative_eq!(result.last().unwrap().unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rsi_flat_series_is_neutral() {
        let values = vec![50.0; 20];
        let result = rsi(&values, 14);

        assert_eq!(result.last().unwrap(), &Some(50.0));
    }

    #[test]
    fn test_rsi_bounded() {
        let values = vec![
            44.0, 44.25, 44.5, 43.75, 44.5, 44.25, 44.0, 43.5, 44.0, 44.5, 45.0, 45.25, 45.5, 45.0,
            44.75, 45.5, 46.0, 45.25,
        ];
        for value in rsi(&values, 14).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn test_rsi_wilder_smoothing() {
        // 3 changes: +2, -1, +1 with period 2
        let values = vec![10.0, 12.0, 11.0, 12.0];
        let result = rsi(&values, 2);

        // seed: gain 1.0, loss 0.5 -> RS 2 -> 66.67
        assert_relative_eq!(result[2].unwrap(), 100.0 - 100.0 / 3.0, epsilon = 1e-9);
        // next: gain (1*1 + 1)/2 = 1.0, loss (0.5*1 + 0)/2 = 0.25 -> RS 4 -> 80
        assert_relative_eq!(result[3].unwrap(), 80.0, epsilon = 1e-9);
    }

    #[test]
    fn test_atr_wilder() {
        let high = vec![10.0, 11.0, 12.0, 11.5, 12.0];
        let low = vec![9.0, 10.0, 11.0, 10.5, 11.0];
        let close = vec![9.5, 10.5, 11.5, 11.0, 11.5];

        let tr = true_range(&high, &low, &close);
        assert_eq!(tr, vec![1.0, 1.5, 1.5, 1.0, 1.0]);

        let result = atr(&high, &low, &close, 3);
        assert_eq!(result[1], None);
        assert_relative_eq!(result[2].unwrap(), 4.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(
            result[3].unwrap(),
            (4.0 / 3.0 * 2.0 + 1.0) / 3.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_atr_percent() {
        assert_eq!(atr_percent(2.0, 100.0), Some(2.0));
        assert_eq!(atr_percent(2.0, 0.0), None);
    }

    #[test]
    fn test_pct_change() {
        let result = pct_change(&[100.0, 102.0, 99.96]);
        assert_eq!(result[0], None);
        assert_relative_eq!(result[1].unwrap(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(result[2].unwrap(), -2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_volume_ratio_and_average() {
        let volume = vec![100.0, 200.0, 300.0];
        let baseline = vec![None, Some(100.0), Some(0.0)];
        let ratio = volume_ratio(&volume, &baseline);
        assert_eq!(ratio, vec![None, Some(2.0), None]);

        let series = vec![None, Some(1.0), Some(2.0), Some(3.0), Some(4.0)];
        let avg = rolling_mean(&series, 2);
        assert_eq!(avg, vec![None, None, Some(1.5), Some(2.5), Some(3.5)]);
    }

    #[test]
    fn test_vol_price_ratio() {
        let ratio = vec![None, Some(2.0), Some(0.5)];
        let change = vec![None, Some(-1.5), None];
        assert_eq!(vol_price_ratio(&ratio, &change), vec![None, Some(3.0), None]);
    }

    #[test]
    fn test_volume_status_ladder() {
        assert_eq!(VolumeStatus::classify(2.5), VolumeStatus::VeryHigh);
        assert_eq!(VolumeStatus::classify(2.0), VolumeStatus::High);
        assert_eq!(VolumeStatus::classify(1.5), VolumeStatus::High);
        assert_eq!(VolumeStatus::classify(1.2), VolumeStatus::Normal);
        assert_eq!(VolumeStatus::classify(0.5), VolumeStatus::Normal);
        assert_eq!(VolumeStatus::classify(0.49), VolumeStatus::Low);
        assert_eq!(VolumeStatus::VeryHigh.to_string(), "very_high");
    }

    #[test]
    fn test_series_alignment_and_snapshot() {
        let start = chrono::Utc::now();
        let candles: Vec<Candle> = (0..40)
            .map(|i| {
                let price = 100.0 + i as f64;
                Candle::new_unchecked(
                    start + chrono::Duration::hours(i),
                    price,
                    price + 1.0,
                    price - 1.0,
                    price + 0.5,
                    1000.0,
                )
            })
            .collect();

        let series = IndicatorSeries::compute(&candles, &IndicatorConfig::default());
        assert_eq!(series.len(), 40);
        assert_eq!(series.sma.len(), 40);
        assert_eq!(series.volume_ratio_avg.len(), 40);
        assert!(series.ema[19].is_none());
        assert!(series.ema[20].is_some());
        assert!(series.sma[28].is_none());
        assert!(series.sma[29].is_some());

        let snapshot = series.latest();
        assert_relative_eq!(snapshot.rsi.unwrap(), 100.0);
        assert_relative_eq!(snapshot.volume_ratio.unwrap(), 1.0, epsilon = 1e-9);
        assert_eq!(snapshot.volume_status, Some(VolumeStatus::Normal));
        assert!(snapshot.atr.unwrap() > 0.0);
    }

    #[test]
    fn test_empty_window_snapshot_is_unavailable() {
        let series = IndicatorSeries::compute(&[], &IndicatorConfig::default());
        assert!(series.is_empty());
        assert_eq!(series.latest(), IndicatorSnapshot::default());
    }
}
