//! Reviewer score normalization.
//!
//! Each standardized score is passed through a sign-preserving power
//! transform (θ = [`SCORE_THETA`]) before averaging, which compresses the
//! magnitude of outliers while keeping their direction.

use appmine_core::constants::SCORE_THETA;
use appmine_core::error::ScoreError;
use appmine_core::types::EntryId;

/// Sign-preserving power transform: `s^θ` for `s ≥ 0`, `-((-s)^θ)` otherwise.
pub fn weighted(score: f64) -> f64 {
    if score >= 0.0 {
        score.powf(SCORE_THETA)
    } else {
        -(-score).powf(SCORE_THETA)
    }
}

/// Mean of the weighted scores of one entry in one period.
///
/// An entry without rankings has no average; callers must not ask for one.
pub fn average_ranking(entry_id: EntryId, scores: &[f64]) -> Result<f64, ScoreError> {
    if scores.is_empty() {
        return Err(ScoreError::EmptyRankings { entry_id });
    }
    let sum: f64 = scores.iter().copied().map(weighted).sum();
    Ok(sum / scores.len() as f64)
}
