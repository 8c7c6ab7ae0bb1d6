//! The DCA rule battery
//!
//! Every rule is an independent, pure function of [`DcaInputs`] returning an
//! optional [`Adjustment`]. A rule whose inputs are unavailable simply does
//! not fire. Rules are applied in the order [`standard_rules`] returns them;
//! order only matters for the reasoning trail and the tentative rule signal.

use super::scorer::DcaInputs;
use super::DcaSignal;
use crate::indicators::VolumeStatus;

/// Deltas contributed by one rule
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Adjustment {
    pub confidence: f64,
    pub multiplier: f64,
    /// Tentative signal; the last rule to set one wins
    pub signal: Option<DcaSignal>,
    pub reasons: Vec<String>,
}

impl Adjustment {
    pub fn new(confidence: f64, multiplier: f64) -> Self {
        Adjustment {
            confidence,
            multiplier,
            ..Default::default()
        }
    }

    pub fn with_signal(mut self, signal: DcaSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }

    /// Fold a conditional follow-up into this adjustment
    fn and(mut self, extra: Option<Adjustment>) -> Self {
        if let Some(extra) = extra {
            self.confidence += extra.confidence;
            self.multiplier += extra.multiplier;
            if extra.signal.is_some() {
                self.signal = extra.signal;
            }
            self.reasons.extend(extra.reasons);
        }
        self
    }
}

/// A single heuristic in the scoring battery
pub trait DcaRule: Send + Sync {
    /// Stable identifier, used in logs and tests
    fn name(&self) -> &'static str;

    /// Adjustment to apply, or `None` when the rule does not fire
    fn evaluate(&self, inputs: &DcaInputs<'_>) -> Option<Adjustment>;
}

/// Rule backed by a plain function or closure
pub struct FnRule<F> {
    name: &'static str,
    eval: F,
}

impl<F> FnRule<F>
where
    F: Fn(&DcaInputs<'_>) -> Option<Adjustment> + Send + Sync,
{
    pub fn new(name: &'static str, eval: F) -> Self {
        FnRule { name, eval }
    }
}

impl<F> DcaRule for FnRule<F>
where
    F: Fn(&DcaInputs<'_>) -> Option<Adjustment> + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn evaluate(&self, inputs: &DcaInputs<'_>) -> Option<Adjustment> {
        (self.eval)(inputs)
    }
}

/// The standard 17-rule battery in evaluation order
pub fn standard_rules() -> Vec<Box<dyn DcaRule>> {
    vec![
        Box::new(FnRule::new("rsi_oversold", rsi_oversold)),
        Box::new(FnRule::new("rsi_buy_zone", rsi_buy_zone)),
        Box::new(FnRule::new("rsi_overbought", rsi_overbought)),
        Box::new(FnRule::new("ema_uptrend", ema_uptrend)),
        Box::new(FnRule::new("ema_downtrend", ema_downtrend)),
        Box::new(FnRule::new("sma_uptrend", sma_uptrend)),
        Box::new(FnRule::new("sma_downtrend", sma_downtrend)),
        Box::new(FnRule::new("high_volatility", high_volatility)),
        Box::new(FnRule::new("low_volatility", low_volatility)),
        Box::new(FnRule::new("near_support", near_support)),
        Box::new(FnRule::new("approaching_support", approaching_support)),
        Box::new(FnRule::new("very_high_volume", very_high_volume)),
        Box::new(FnRule::new("high_volume", high_volume)),
        Box::new(FnRule::new("low_volume", low_volume)),
        Box::new(FnRule::new("volume_trend_up", volume_trend_up)),
        Box::new(FnRule::new("volume_trend_down", volume_trend_down)),
        Box::new(FnRule::new("unconfirmed_move", unconfirmed_move)),
    ]
}

// =============================================================================
// RSI
// =============================================================================

pub fn rsi_oversold(inputs: &DcaInputs<'_>) -> Option<Adjustment> {
    let rsi = inputs.rsi.filter(|&rsi| rsi < 30.0)?;
    Some(
        Adjustment::new(15.0, 0.1)
            .with_signal(DcaSignal::Buy)
            .reason(format!("RSI oversold ({:.1})", rsi)),
    )
}

pub fn rsi_buy_zone(inputs: &DcaInputs<'_>) -> Option<Adjustment> {
    let rsi = inputs.rsi.filter(|&rsi| (30.0..40.0).contains(&rsi))?;
    Some(
        Adjustment::new(10.0, 0.0)
            .with_signal(DcaSignal::Buy)
            .reason(format!("RSI in potential buying opportunity zone ({:.1})", rsi)),
    )
}

pub fn rsi_overbought(inputs: &DcaInputs<'_>) -> Option<Adjustment> {
    let rsi = inputs.rsi.filter(|&rsi| rsi > 70.0)?;
    Some(
        Adjustment::new(-20.0, -0.1)
            .with_signal(DcaSignal::Wait)
            .reason(format!("RSI overbought ({:.1})", rsi)),
    )
}

// =============================================================================
// Trend
// =============================================================================

pub fn ema_uptrend(inputs: &DcaInputs<'_>) -> Option<Adjustment> {
    inputs
        .ema
        .filter(|&ema| inputs.current_price > ema * 1.02)
        .map(|_| Adjustment::new(10.0, 0.0).reason("Price above EMA: short-term uptrend"))
}

pub fn ema_downtrend(inputs: &DcaInputs<'_>) -> Option<Adjustment> {
    inputs
        .ema
        .filter(|&ema| inputs.current_price < ema * 0.98)
        .map(|_| {
            Adjustment::new(-15.0, -0.1)
                .with_signal(DcaSignal::Wait)
                .reason("Price below EMA: short-term downtrend")
        })
}

pub fn sma_uptrend(inputs: &DcaInputs<'_>) -> Option<Adjustment> {
    inputs
        .sma
        .filter(|&sma| inputs.current_price > sma * 1.05)
        .map(|_| Adjustment::new(10.0, 0.0).reason("Price well above SMA: strong medium-term uptrend"))
}

pub fn sma_downtrend(inputs: &DcaInputs<'_>) -> Option<Adjustment> {
    inputs
        .sma
        .filter(|&sma| inputs.current_price < sma * 0.95)
        .map(|_| Adjustment::new(-10.0, 0.0).reason("Price well below SMA: medium-term downtrend"))
}

// =============================================================================
// Volatility
// =============================================================================

pub fn high_volatility(inputs: &DcaInputs<'_>) -> Option<Adjustment> {
    let atr_pct = inputs.atr_percent().filter(|&pct| pct > 5.0)?;
    Some(Adjustment::new(0.0, -0.1).reason(format!("High volatility (ATR {:.2}%)", atr_pct)))
}

pub fn low_volatility(inputs: &DcaInputs<'_>) -> Option<Adjustment> {
    let atr_pct = inputs.atr_percent().filter(|&pct| pct < 1.0)?;
    Some(Adjustment::new(5.0, 0.0).reason(format!(
        "Low volatility, stable conditions (ATR {:.2}%)",
        atr_pct
    )))
}

// =============================================================================
// Support proximity
// =============================================================================

pub fn near_support(inputs: &DcaInputs<'_>) -> Option<Adjustment> {
    let distance = inputs
        .nearest_support_distance_pct()
        .filter(|&pct| pct <= 2.0)?;
    Some(
        Adjustment::new(10.0, 0.2)
            .with_signal(DcaSignal::StrongBuy)
            .reason(format!("Near strong support ({:.2}% away)", distance)),
    )
}

pub fn approaching_support(inputs: &DcaInputs<'_>) -> Option<Adjustment> {
    let distance = inputs
        .nearest_support_distance_pct()
        .filter(|&pct| pct > 2.0 && pct <= 5.0)?;
    Some(Adjustment::new(5.0, 0.1).reason(format!("Approaching support ({:.2}% away)", distance)))
}

// =============================================================================
// Volume
// =============================================================================

pub fn very_high_volume(inputs: &DcaInputs<'_>) -> Option<Adjustment> {
    if inputs.volume_status != Some(VolumeStatus::VeryHigh) {
        return None;
    }
    let confirmed = inputs
        .vol_price_ratio
        .filter(|&vpr| vpr > 1.5)
        .map(|_| Adjustment::new(10.0, 0.0).reason("Volume confirms strong price movement"));
    Some(
        Adjustment::new(15.0, 0.2)
            .reason("Very high volume: potential breakout/breakdown")
            .and(confirmed),
    )
}

/// High volume. A vol/price ratio above 1.0 adds 5 more confidence under
/// its own reason line, "Volume supports price movement".
pub fn high_volume(inputs: &DcaInputs<'_>) -> Option<Adjustment> {
    if inputs.volume_status != Some(VolumeStatus::High) {
        return None;
    }
    let supported = inputs
        .vol_price_ratio
        .filter(|&vpr| vpr > 1.0)
        .map(|_| Adjustment::new(5.0, 0.0).reason("Volume supports price movement"));
    Some(
        Adjustment::new(10.0, 0.1)
            .reason("High volume supports move")
            .and(supported),
    )
}

pub fn low_volume(inputs: &DcaInputs<'_>) -> Option<Adjustment> {
    if inputs.volume_status != Some(VolumeStatus::Low) {
        return None;
    }
    let unsupported = inputs
        .vol_price_ratio
        .filter(|&vpr| vpr < 0.5)
        .map(|_| Adjustment::new(-5.0, 0.0).reason("Price moving without volume support"));
    Some(
        Adjustment::new(-10.0, -0.1)
            .reason("Low volume: weak momentum")
            .and(unsupported),
    )
}

pub fn volume_trend_up(inputs: &DcaInputs<'_>) -> Option<Adjustment> {
    inputs
        .volume_ratio_avg
        .filter(|&avg| avg > 1.3)
        .map(|_| Adjustment::new(5.0, 0.0).reason("Volume trend increasing"))
}

pub fn volume_trend_down(inputs: &DcaInputs<'_>) -> Option<Adjustment> {
    inputs
        .volume_ratio_avg
        .filter(|&avg| avg < 0.7)
        .map(|_| Adjustment::new(-5.0, 0.0).reason("Volume trend decreasing"))
}

pub fn unconfirmed_move(inputs: &DcaInputs<'_>) -> Option<Adjustment> {
    let vpr = inputs.vol_price_ratio?;
    let change = inputs.price_change_pct?;
    if vpr < 0.3 && change.abs() > 2.0 {
        Some(
            Adjustment::new(-10.0, 0.0)
                .with_signal(DcaSignal::Wait)
                .reason("Price moving without volume confirmation"),
        )
    } else {
        None
    }
}
