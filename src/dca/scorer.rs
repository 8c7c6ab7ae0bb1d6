//! Rule reducer producing the final [`Recommendation`]

use super::rules::{standard_rules, DcaRule};
use super::{
    DcaSignal, Recommendation, BASE_CONFIDENCE, BASE_MULTIPLIER, MAX_CONFIDENCE, MAX_MULTIPLIER,
    MIN_CONFIDENCE, MIN_MULTIPLIER,
};
use crate::indicators::{atr_percent, IndicatorSnapshot, VolumeStatus};
use crate::levels::PriceLevel;

/// Everything the rule battery looks at. `None` means unavailable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DcaInputs<'a> {
    pub current_price: f64,
    pub atr: Option<f64>,
    pub ema: Option<f64>,
    pub sma: Option<f64>,
    pub support_levels: &'a [PriceLevel],
    pub rsi: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub volume_ratio_avg: Option<f64>,
    pub vol_price_ratio: Option<f64>,
    pub volume_status: Option<VolumeStatus>,
    pub price_change_pct: Option<f64>,
}

impl<'a> DcaInputs<'a> {
    /// Inputs with only a price; every indicator unavailable
    pub fn new(current_price: f64) -> Self {
        DcaInputs {
            current_price,
            atr: None,
            ema: None,
            sma: None,
            support_levels: &[],
            rsi: None,
            volume_ratio: None,
            volume_ratio_avg: None,
            vol_price_ratio: None,
            volume_status: None,
            price_change_pct: None,
        }
    }

    pub fn from_snapshot(
        current_price: f64,
        snapshot: &IndicatorSnapshot,
        support_levels: &'a [PriceLevel],
    ) -> Self {
        DcaInputs {
            current_price,
            atr: snapshot.atr,
            ema: snapshot.ema,
            sma: snapshot.sma,
            support_levels,
            rsi: snapshot.rsi,
            volume_ratio: snapshot.volume_ratio,
            volume_ratio_avg: snapshot.volume_ratio_avg,
            vol_price_ratio: snapshot.vol_price_ratio,
            volume_status: snapshot.volume_status,
            price_change_pct: snapshot.price_change_pct,
        }
    }

    /// ATR as a percentage of the current price
    pub fn atr_percent(&self) -> Option<f64> {
        self.atr.and_then(|atr| atr_percent(atr, self.current_price))
    }

    /// Distance from the current price down to the closest support at or
    /// below it, in percent of the price
    pub fn nearest_support_distance_pct(&self) -> Option<f64> {
        if self.current_price <= 0.0 {
            return None;
        }
        self.support_levels
            .iter()
            .map(|level| level.price)
            .filter(|&price| price <= self.current_price)
            .fold(None, |best: Option<f64>, price| {
                Some(best.map_or(price, |b| b.max(price)))
            })
            .map(|support| (self.current_price - support) / self.current_price * 100.0)
    }
}

/// Applies an ordered rule battery and finalizes the totals
pub struct DcaScorer {
    rules: Vec<Box<dyn DcaRule>>,
}

impl Default for DcaScorer {
    fn default() -> Self {
        DcaScorer::new()
    }
}

impl std::fmt::Debug for DcaScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DcaScorer")
            .field("rules", &self.rule_names())
            .finish()
    }
}

impl DcaScorer {
    /// Scorer with the standard battery
    pub fn new() -> Self {
        DcaScorer::with_rules(standard_rules())
    }

    pub fn with_rules(rules: Vec<Box<dyn DcaRule>>) -> Self {
        DcaScorer { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn score(&self, inputs: &DcaInputs<'_>) -> Recommendation {
        let mut confidence = BASE_CONFIDENCE;
        let mut multiplier = BASE_MULTIPLIER;
        let mut rule_signal = DcaSignal::Hold;
        let mut reasoning = Vec::new();

        for adjustment in self.rules.iter().filter_map(|rule| rule.evaluate(inputs)) {
            confidence += adjustment.confidence;
            multiplier += adjustment.multiplier;
            if let Some(signal) = adjustment.signal {
                rule_signal = signal;
            }
            reasoning.extend(adjustment.reasons);
        }

        let confidence = confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE);
        let amount_multiplier = multiplier.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER);
        let signal = DcaSignal::from_confidence(confidence);

        Recommendation {
            signal,
            confidence,
            amount_multiplier,
            sentiment: signal.sentiment(),
            reasoning,
            rule_signal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dca::{Adjustment, FnRule, Sentiment};
    use crate::levels::{LevelKind, LevelSource};
    use approx::assert_relative_eq;

    fn support(price: f64) -> PriceLevel {
        PriceLevel::new(price, LevelKind::Support, 1, LevelSource::Extremum)
    }

    #[test]
    fn test_no_inputs_is_neutral_hold() {
        let rec = DcaScorer::new().score(&DcaInputs::new(100.0));
        assert_eq!(rec.confidence, 50.0);
        assert_eq!(rec.amount_multiplier, 1.0);
        assert_eq!(rec.signal, DcaSignal::Hold);
        assert_eq!(rec.sentiment, Sentiment::Neutral);
        assert_eq!(rec.rule_signal, DcaSignal::Hold);
        assert!(rec.reasoning.is_empty());
    }

    #[test]
    fn test_support_and_very_high_volume_is_strong_buy() {
        let levels = [support(99.0)];
        let inputs = DcaInputs {
            support_levels: &levels,
            volume_status: Some(VolumeStatus::VeryHigh),
            vol_price_ratio: Some(2.0),
            ..DcaInputs::new(100.0)
        };

        let rec = DcaScorer::new().score(&inputs);

        assert_relative_eq!(rec.confidence, 85.0);
        assert_relative_eq!(rec.amount_multiplier, 1.4, epsilon = 1e-12);
        assert_eq!(rec.signal, DcaSignal::StrongBuy);
        assert_eq!(rec.sentiment, Sentiment::Bullish);
        assert_eq!(rec.reasoning.len(), 3);
    }

    #[test]
    fn test_nearest_support_ignores_levels_above_price() {
        let levels = [support(105.0), support(97.0), support(90.0)];
        let inputs = DcaInputs {
            support_levels: &levels,
            ..DcaInputs::new(100.0)
        };
        assert_relative_eq!(inputs.nearest_support_distance_pct().unwrap(), 3.0, epsilon = 1e-9);

        let above_only = [support(105.0)];
        let inputs = DcaInputs {
            support_levels: &above_only,
            ..DcaInputs::new(100.0)
        };
        assert!(inputs.nearest_support_distance_pct().is_none());
    }

    #[test]
    fn test_final_ladder_overrides_rule_signal() {
        // oversold sets a buy, but the downtrend and thin volume drag confidence
        let inputs = DcaInputs {
            rsi: Some(25.0),
            ema: Some(110.0),
            sma: Some(110.0),
            volume_status: Some(VolumeStatus::Low),
            vol_price_ratio: Some(0.1),
            price_change_pct: Some(-4.0),
            ..DcaInputs::new(100.0)
        };

        let rec = DcaScorer::new().score(&inputs);

        // 50 + 15 - 15 - 10 - 10 - 5 - 10
        assert_relative_eq!(rec.confidence, 15.0);
        assert_eq!(rec.rule_signal, DcaSignal::Wait);
        assert_eq!(rec.signal, DcaSignal::Avoid);
        assert_eq!(rec.sentiment, Sentiment::Bearish);
    }

    #[test]
    fn test_clamping_bounds() {
        let boost: Vec<Box<dyn DcaRule>> = (0..10)
            .map(|_| {
                Box::new(FnRule::new("boost", |_: &DcaInputs<'_>| {
                    Some(Adjustment::new(30.0, 0.5))
                })) as Box<dyn DcaRule>
            })
            .collect();
        let rec = DcaScorer::with_rules(boost).score(&DcaInputs::new(1.0));
        assert_eq!(rec.confidence, MAX_CONFIDENCE);
        assert_eq!(rec.amount_multiplier, MAX_MULTIPLIER);
        assert_eq!(rec.signal, DcaSignal::StrongBuy);

        let drag: Vec<Box<dyn DcaRule>> = (0..10)
            .map(|_| {
                Box::new(FnRule::new("drag", |_: &DcaInputs<'_>| {
                    Some(Adjustment::new(-30.0, -0.5))
                })) as Box<dyn DcaRule>
            })
            .collect();
        let rec = DcaScorer::with_rules(drag).score(&DcaInputs::new(1.0));
        assert_eq!(rec.confidence, MIN_CONFIDENCE);
        assert_eq!(rec.amount_multiplier, MIN_MULTIPLIER);
        assert_eq!(rec.signal, DcaSignal::Avoid);
    }

    #[test]
    fn test_bounds_and_ladder_hold_across_input_grid() {
        let scorer = DcaScorer::new();
        let levels = [support(98.5), support(96.0)];
        let statuses = [
            None,
            Some(VolumeStatus::VeryHigh),
            Some(VolumeStatus::High),
            Some(VolumeStatus::Normal),
            Some(VolumeStatus::Low),
        ];

        for rsi in [None, Some(10.0), Some(35.0), Some(55.0), Some(85.0)] {
            for ema in [None, Some(90.0), Some(100.0), Some(110.0)] {
                for status in statuses {
                    for vpr in [None, Some(0.1), Some(1.2), Some(2.5)] {
                        let inputs = DcaInputs {
                            rsi,
                            ema,
                            sma: ema,
                            atr: Some(6.0),
                            support_levels: &levels,
                            volume_status: status,
                            vol_price_ratio: vpr,
                            volume_ratio_avg: Some(1.4),
                            price_change_pct: Some(-3.0),
                            ..DcaInputs::new(100.0)
                        };
                        let rec = scorer.score(&inputs);
                        assert!((MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&rec.confidence));
                        assert!((MIN_MULTIPLIER..=MAX_MULTIPLIER).contains(&rec.amount_multiplier));
                        assert_eq!(rec.signal, DcaSignal::from_confidence(rec.confidence));
                        assert_eq!(rec.sentiment, rec.signal.sentiment());
                    }
                }
            }
        }
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let levels = [support(97.0)];
        let inputs = DcaInputs {
            rsi: Some(33.0),
            ema: Some(101.0),
            sma: Some(99.0),
            atr: Some(0.8),
            support_levels: &levels,
            volume_status: Some(VolumeStatus::High),
            vol_price_ratio: Some(1.1),
            volume_ratio_avg: Some(1.35),
            price_change_pct: Some(0.5),
            ..DcaInputs::new(100.0)
        };
        let scorer = DcaScorer::new();
        assert_eq!(scorer.score(&inputs), scorer.score(&inputs));
    }
}
