//! Exponential smoothing of an entry's score with its prior-period score.
//!
//! Two regimes exist, chosen by the period being blended:
//!
//! | Regime    | Periods        | Formula                                   |
//! |-----------|----------------|-------------------------------------------|
//! | `Legacy`  | before 2019-04 | `(5 * current + 4 * previous) / 9`        |
//! | `Recency` | 2019-04 onward | `0.25 * previous + 0.75 * current`        |

use appmine_core::constants::{
    LEGACY_CURRENT_WEIGHT, LEGACY_DIVISOR, LEGACY_PREVIOUS_WEIGHT, RECENCY_CURRENT_WEIGHT,
    RECENCY_PREVIOUS_WEIGHT, RECENCY_REGIME_START,
};
use appmine_core::types::PeriodKey;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingRegime {
    Legacy,
    Recency,
}

impl SmoothingRegime {
    pub fn for_period(key: PeriodKey) -> Self {
        if key >= RECENCY_REGIME_START {
            Self::Recency
        } else {
            Self::Legacy
        }
    }

    fn blend(self, current: f64, previous: f64) -> f64 {
        match self {
            Self::Recency => RECENCY_PREVIOUS_WEIGHT * previous + RECENCY_CURRENT_WEIGHT * current,
            Self::Legacy => {
                (LEGACY_CURRENT_WEIGHT * current + LEGACY_PREVIOUS_WEIGHT * previous)
                    / LEGACY_DIVISOR
            }
        }
    }
}

/// An entry's standing in the prior period.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriorScore {
    /// Memory ranking carried by the prior period, when it has one.
    pub memory: Option<f64>,
    /// Plain average ranking of the prior period.
    pub average: f64,
}

impl PriorScore {
    /// Value blended against the current score: the prior memory ranking,
    /// falling back to the prior average.
    pub fn reference(&self) -> f64 {
        self.memory.unwrap_or(self.average)
    }
}

/// Memory ranking of an entry for the period `key`.
///
/// Without a prior score the current average is returned unchanged.
pub fn memory_ranking(key: PeriodKey, current: f64, prior: Option<PriorScore>) -> f64 {
    match prior {
        Some(prior) => SmoothingRegime::for_period(key).blend(current, prior.reference()),
        None => current,
    }
}
