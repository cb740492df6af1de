//! Engine constants. Monetary values are fixed-point integers:
//! USD in micro-dollars, BTC in satoshis, STX in micro-STX.

use crate::types::PeriodKey;

/// Exponent of the sign-preserving power transform applied to reviewer scores.
pub const SCORE_THETA: f64 = 0.5;

/// Last period for which the memory function is undefined.
///
/// Any resolved prior period on or before this key is treated as absent.
pub const MEMORY_CUTOFF: PeriodKey = PeriodKey {
    year: 2018,
    month: 11,
};

/// First period blended with the recency-weighted smoothing regime.
pub const RECENCY_REGIME_START: PeriodKey = PeriodKey {
    year: 2019,
    month: 4,
};

/// Weight of the prior score under the recency regime.
pub const RECENCY_PREVIOUS_WEIGHT: f64 = 0.25;

/// Weight of the current score under the recency regime.
pub const RECENCY_CURRENT_WEIGHT: f64 = 0.75;

/// Legacy regime: `(5 * current + 4 * previous) / 9`.
pub const LEGACY_CURRENT_WEIGHT: f64 = 5.0;
pub const LEGACY_PREVIOUS_WEIGHT: f64 = 4.0;
pub const LEGACY_DIVISOR: f64 = 9.0;

/// Micro-dollars per US dollar.
pub const USD_PRECISION: u64 = 1_000_000;

/// Satoshis per BTC.
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Micro-STX per STX.
pub const MICRO_STX_PER_STX: u64 = 1_000_000;

/// Decay rates are stored in parts-per-billion.
pub const DECAY_PRECISION: u64 = 1_000_000_000;

/// Smallest BTC reward ever reported for an entry (0.000055 BTC).
///
/// Applied to the converted reward only; the waterfall's remaining pool
/// is not adjusted.
pub const MIN_BTC_REWARD_SATS: u64 = 5_500;

/// Decimal places used when displaying BTC amounts.
pub const BTC_DECIMALS: u32 = 8;

/// Decimal places used when displaying STX amounts.
pub const STX_DECIMALS: u32 = 6;

/// Maximum number of outputs requested from the ledger service per transaction.
pub const DEFAULT_LEDGER_OUTPUT_LIMIT: u32 = 1000;

/// Default raw-transaction endpoint of the ledger service.
pub const DEFAULT_LEDGER_API: &str = "https://blockchain.info/rawtx";

/// Default human-facing block explorer for transaction links.
pub const DEFAULT_EXPLORER_URL: &str = "https://www.blockchain.com/btc/tx";

/// Offset used for purchase timestamps in reports (US Eastern standard time).
pub const REPORT_UTC_OFFSET_SECS: i32 = -5 * 3600;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_weights_sum_to_one() {
        assert_eq!(RECENCY_PREVIOUS_WEIGHT + RECENCY_CURRENT_WEIGHT, 1.0);
    }

    #[test]
    fn legacy_weights_sum_to_divisor() {
        assert_eq!(LEGACY_CURRENT_WEIGHT + LEGACY_PREVIOUS_WEIGHT, LEGACY_DIVISOR);
    }

    #[test]
    fn btc_floor_is_55_hundred_thousandths() {
        assert_eq!(MIN_BTC_REWARD_SATS as f64 / SATS_PER_BTC as f64, 0.000055);
    }

    #[test]
    fn cutoff_precedes_regime_switch() {
        assert!(MEMORY_CUTOFF < RECENCY_REGIME_START);
    }
}
