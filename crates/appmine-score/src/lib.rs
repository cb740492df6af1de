//! # appmine-score — Composite ranking and payout engine.
//!
//! Reviewer scores are combined into one composite ranking per period and a
//! decaying reward pool is split down that ranking:
//! - **Normalization**: each standardized score goes through a
//!   sign-preserving square root before averaging.
//! - **Memory**: the average is blended with the entry's ranking in the prior
//!   period, with weights that depend on when the period ran.
//! - **History**: the prior period is the latest one before the current
//!   period that is past the memory cutoff.
//! - **Waterfall**: each ranked entry receives a fixed share of what is left
//!   of the pool, converted to BTC (with a dust floor) and optionally STX.
//!
//! Amounts are integers throughout; only the score math uses `f64`.

pub mod engine;
pub mod history;
pub mod memory;
pub mod normalize;
pub mod waterfall;

pub use engine::{Composite, CompositeEngine, CompositeResult, EntryPayout, PeriodRanking, RankedEntry};
pub use memory::{memory_ranking, PriorScore, SmoothingRegime};
pub use normalize::{average_ranking, weighted};
pub use waterfall::{ConversionRate, DecayRate, PayoutPlan, Waterfall};
