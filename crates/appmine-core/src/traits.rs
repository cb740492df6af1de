//! Trait interfaces between the engine and its collaborators.
//!
//! - [`PeriodStore`] — period lookup and report trees (appmine-node implements)
//! - [`EntryStore`] — entry lookup by id and receiving address
//! - [`PayoutStore`] — find-or-create-then-update payout records
//!
//! The ledger client is async and lives with the reconciler in appmine-node.

use crate::error::AppMineError;
use crate::projection::EntryProjection;
use crate::types::{
    Currency, Entry, EntryId, PayoutRecord, Period, PeriodKey, PeriodQuery, PeriodSnapshot,
};

/// Read access to scoring periods.
pub trait PeriodStore: Send + Sync {
    /// Look up a period by key.
    fn get_period(&self, key: PeriodKey) -> Result<Option<Period>, AppMineError>;

    /// Most recent period matching `query`, ordered by `(year desc, month desc)`.
    fn latest_period(&self, query: &PeriodQuery) -> Result<Option<Period>, AppMineError>;

    /// The period with all of its reviewer reports and the entries they rank,
    /// each entry cut down to `projection`. `None` if the period is unknown.
    fn load_snapshot(
        &self,
        key: PeriodKey,
        projection: &EntryProjection,
    ) -> Result<Option<PeriodSnapshot>, AppMineError>;
}

/// Read access to entries.
pub trait EntryStore: Send + Sync {
    fn get_entry(&self, id: EntryId) -> Result<Option<Entry>, AppMineError>;

    /// Entry whose registered address for `currency` equals `address`,
    /// compared case-insensitively.
    fn find_entry_by_address(
        &self,
        currency: Currency,
        address: &str,
    ) -> Result<Option<Entry>, AppMineError>;
}

/// Durable payout records, one per `(period, entry)`.
pub trait PayoutStore: Send + Sync {
    fn get_payout(
        &self,
        period: PeriodKey,
        entry_id: EntryId,
    ) -> Result<Option<PayoutRecord>, AppMineError>;

    /// Find or create the record for `(period, entry_id)` and set its
    /// `currency` value. Returns the stored record.
    fn upsert_payout(
        &self,
        period: PeriodKey,
        entry_id: EntryId,
        currency: Currency,
        value: u64,
    ) -> Result<PayoutRecord, AppMineError>;

    /// All records of a period, ordered by entry id.
    fn payouts_for_period(&self, period: PeriodKey) -> Result<Vec<PayoutRecord>, AppMineError>;
}
