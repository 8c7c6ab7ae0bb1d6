//! DCA recommendation engine
//!
//! A single-pass accumulator over an ordered battery of independent rules
//! (see [`rules`]). Rules nudge confidence, the size multiplier and a
//! tentative signal; [`DcaScorer`] clamps the totals and re-derives the final
//! signal strictly from confidence.

pub mod rules;
pub mod scorer;

pub use rules::{standard_rules, Adjustment, DcaRule, FnRule};
pub use scorer::{DcaInputs, DcaScorer};

use serde::{Deserialize, Serialize};

/// Confidence a scoring pass starts from
pub const BASE_CONFIDENCE: f64 = 50.0;
/// Multiplier a scoring pass starts from
pub const BASE_MULTIPLIER: f64 = 1.0;

pub const MIN_CONFIDENCE: f64 = 0.0;
pub const MAX_CONFIDENCE: f64 = 100.0;
pub const MIN_MULTIPLIER: f64 = 0.5;
pub const MAX_MULTIPLIER: f64 = 2.0;

/// DCA action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DcaSignal {
    StrongBuy,
    Buy,
    Hold,
    Wait,
    Avoid,
}

impl DcaSignal {
    /// Final signal ladder: >=80 strong_buy, >=60 buy, >=40 hold, >=20 wait
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 80.0 {
            DcaSignal::StrongBuy
        } else if confidence >= 60.0 {
            DcaSignal::Buy
        } else if confidence >= 40.0 {
            DcaSignal::Hold
        } else if confidence >= 20.0 {
            DcaSignal::Wait
        } else {
            DcaSignal::Avoid
        }
    }

    pub fn sentiment(&self) -> Sentiment {
        match self {
            DcaSignal::StrongBuy | DcaSignal::Buy => Sentiment::Bullish,
            DcaSignal::Hold => Sentiment::Neutral,
            DcaSignal::Wait | DcaSignal::Avoid => Sentiment::Bearish,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DcaSignal::StrongBuy => "strong_buy",
            DcaSignal::Buy => "buy",
            DcaSignal::Hold => "hold",
            DcaSignal::Wait => "wait",
            DcaSignal::Avoid => "avoid",
        }
    }
}

impl std::fmt::Display for DcaSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market mood implied by the final signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Bullish,
    Neutral,
    Bearish,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Bullish => "bullish",
            Sentiment::Neutral => "neutral",
            Sentiment::Bearish => "bearish",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one scoring pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub signal: DcaSignal,
    pub confidence: f64,
    pub amount_multiplier: f64,
    pub sentiment: Sentiment,
    pub reasoning: Vec<String>,
    /// Last signal written by an individual rule. Informational only: the
    /// final `signal` always comes from the confidence ladder.
    #[serde(skip)]
    pub rule_signal: DcaSignal,
}
