//! Geometric-decay payout waterfall.
//!
//! All amounts are integers: USD in micro-dollars, coins in their smallest
//! unit, decay rates in parts-per-billion. Each step hands out
//! `floor(remaining * rate)`, so the payouts of a currency never sum to more
//! than its budget. Whatever is left after the last entry is not distributed.

use appmine_core::amount::usd_to_micros;
use appmine_core::constants::{
    DECAY_PRECISION, MICRO_STX_PER_STX, MIN_BTC_REWARD_SATS, SATS_PER_BTC, USD_PRECISION,
};
use appmine_core::error::ConfigError;
use appmine_core::types::Period;

/// One whole US dollar in micro-dollars.
pub const ONE_USD: u64 = USD_PRECISION;

/// Share of the remaining pool handed to the next entry, in parts-per-billion.
///
/// Always strictly between 0 and [`DECAY_PRECISION`]. Fractions are rounded
/// to the nearest ppb, so a rate within half a ppb of 0 or 1 cannot be
/// represented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecayRate(u64);

impl DecayRate {
    /// Validate a decay fraction; `0`, `≥ 1` and NaN are configuration errors.
    /// In-range fractions that round to 0 or [`DECAY_PRECISION`] ppb are
    /// [`ConfigError::DecayRateTooFine`].
    pub fn from_fraction(fraction: f64) -> Result<Self, ConfigError> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(ConfigError::InvalidDecayRate(fraction));
        }
        let ppb = (fraction * DECAY_PRECISION as f64).round() as u64;
        if ppb == 0 || ppb >= DECAY_PRECISION {
            return Err(ConfigError::DecayRateTooFine(fraction));
        }
        Ok(Self(ppb))
    }

    pub fn ppb(&self) -> u64 {
        self.0
    }

    /// `floor(amount * rate)`.
    fn apply(&self, amount: u64) -> u64 {
        (amount as u128 * self.0 as u128 / DECAY_PRECISION as u128) as u64
    }
}

/// USD value of one whole coin, in micro-dollars.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConversionRate(u64);

impl ConversionRate {
    pub fn from_usd_per_coin(usd: f64) -> Result<Self, ConfigError> {
        if !(usd > 0.0) || usd.is_infinite() {
            return Err(ConfigError::InvalidConversionRate(usd));
        }
        match usd_to_micros(usd)? {
            0 => Err(ConfigError::InvalidConversionRate(usd)),
            micros => Ok(Self(micros)),
        }
    }

    pub fn micros_per_coin(&self) -> u64 {
        self.0
    }

    /// Convert micro-dollars to smallest coin units (floor).
    pub fn to_units(&self, usd_micros: u64, units_per_coin: u64) -> u64 {
        let units = usd_micros as u128 * units_per_coin as u128 / self.0 as u128;
        units.min(u64::MAX as u128) as u64
    }
}

/// Stateful waterfall over one budget. Yields payouts forever, each a
/// `rate` share of what is left.
#[derive(Clone, Debug)]
pub struct Waterfall {
    remaining: u64,
    decay: DecayRate,
}

impl Waterfall {
    pub fn new(budget: u64, decay: DecayRate) -> Self {
        Self {
            remaining: budget,
            decay,
        }
    }

    /// Next payout; the pool shrinks by exactly that amount.
    pub fn next_payout(&mut self) -> u64 {
        let payout = self.decay.apply(self.remaining);
        self.remaining -= payout;
        payout
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Iterator for Waterfall {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        Some(self.next_payout())
    }
}

/// Payouts for a ranked list of `count` entries and the undistributed rest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub payouts: Vec<u64>,
    pub remaining: u64,
}

impl Allocation {
    pub fn total(&self) -> u64 {
        self.payouts.iter().sum()
    }
}

/// Run the waterfall over `count` ranked entries.
pub fn allocate(budget: u64, decay: DecayRate, count: usize) -> Allocation {
    let mut waterfall = Waterfall::new(budget, decay);
    let payouts = waterfall.by_ref().take(count).collect();
    Allocation {
        payouts,
        remaining: waterfall.remaining(),
    }
}

/// BTC reward in satoshis for a USD payout, never below
/// [`MIN_BTC_REWARD_SATS`].
pub fn btc_reward(usd_micros: u64, rate: ConversionRate) -> u64 {
    rate.to_units(usd_micros, SATS_PER_BTC).max(MIN_BTC_REWARD_SATS)
}

/// STX reward in micro-STX for a USD payout.
pub fn stx_reward(usd_micros: u64, rate: ConversionRate) -> u64 {
    rate.to_units(usd_micros, MICRO_STX_PER_STX)
}

/// Validated budget, decay and conversion rate of one currency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CurrencyPlan {
    /// Micro-dollars.
    pub budget: u64,
    pub decay: DecayRate,
    pub rate: ConversionRate,
}

impl CurrencyPlan {
    pub fn allocate(&self, count: usize) -> Allocation {
        allocate(self.budget, self.decay, count)
    }
}

/// Payout configuration of a period, validated before any allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayoutPlan {
    pub btc: CurrencyPlan,
    /// Present only when the period has a positive STX budget.
    pub stx: Option<CurrencyPlan>,
}

impl PayoutPlan {
    pub fn from_period(period: &Period) -> Result<Self, ConfigError> {
        let required = |value: Option<f64>, setting: &'static str| {
            value.ok_or(ConfigError::MissingSetting {
                period: period.key,
                setting,
            })
        };

        let btc = CurrencyPlan {
            budget: usd_to_micros(required(period.btc_payout_total, "btc_payout_total")?)?,
            decay: DecayRate::from_fraction(required(period.btc_payout_decay, "btc_payout_decay")?)?,
            rate: ConversionRate::from_usd_per_coin(required(
                period.purchase_conversion_rate,
                "purchase_conversion_rate",
            )?)?,
        };

        let stx = match period.stx_payout_total {
            Some(total) if total != 0.0 => Some(CurrencyPlan {
                budget: usd_to_micros(total)?,
                decay: DecayRate::from_fraction(required(
                    period.stx_payout_decay,
                    "stx_payout_decay",
                )?)?,
                rate: ConversionRate::from_usd_per_coin(required(
                    period.stx_payout_conversion_rate,
                    "stx_payout_conversion_rate",
                )?)?,
            }),
            _ => None,
        };

        Ok(Self { btc, stx })
    }
}
