//! Prior-period resolution for memory smoothing.

use appmine_core::constants::MEMORY_CUTOFF;
use appmine_core::error::AppMineError;
use appmine_core::traits::PeriodStore;
use appmine_core::types::{Period, PeriodKey};
use tracing::debug;

/// Whether a resolved prior period may feed the memory function.
///
/// Periods on or before [`MEMORY_CUTOFF`] lack the required history chain.
pub fn is_memory_eligible(key: PeriodKey) -> bool {
    key > MEMORY_CUTOFF
}

/// The most recent eligible period before `key`, or `None` when there is no
/// usable history.
///
/// Errors if the store answers with a period that is not strictly earlier
/// than `key`, since recursion over such an answer would not terminate.
pub fn resolve_previous<S>(store: &S, key: PeriodKey) -> Result<Option<Period>, AppMineError>
where
    S: PeriodStore + ?Sized,
{
    let query = key.prior_search();
    let Some(candidate) = store.latest_period(&query)? else {
        debug!(period = %key, "no prior period");
        return Ok(None);
    };

    if candidate.key >= key || !query.matches(candidate.key) {
        return Err(AppMineError::Storage(format!(
            "store returned {} as the period before {}",
            candidate.key, key
        )));
    }

    if !is_memory_eligible(candidate.key) {
        debug!(period = %key, prior = %candidate.key, "prior period predates memory cutoff");
        return Ok(None);
    }

    debug!(period = %key, prior = %candidate.key, "resolved prior period");
    Ok(Some(candidate))
}
