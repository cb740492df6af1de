//! Payment reconciliation.
//!
//! Given the transaction that paid out a period, [`PaymentReconciler`] reads
//! its outputs from the ledger, matches each receiving address to an entry and
//! records the observed value as that entry's payout. Outputs are grouped by
//! lower-cased address first, so every entry is written at most once per pass
//! and a repeated pass over the same transaction rewrites the same values.
//!
//! Address matches run concurrently on the blocking pool. The first failure
//! ends the pass; records already written stay written.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::info;

use appmine_core::error::AppMineError;
use appmine_core::traits::{EntryStore, PayoutStore, PeriodStore};
use appmine_core::types::{Currency, LedgerOutput, PayoutRecord, PeriodKey};

use crate::ledger::LedgerClient;

/// Outcome of one reconciliation pass.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ReconcileReport {
    pub transaction_id: String,
    /// Records written, ordered by entry id.
    pub matched: Vec<PayoutRecord>,
    /// Lower-cased addresses with no registered entry, sorted.
    pub unmatched: Vec<String>,
}

enum OutputMatch {
    Matched(PayoutRecord),
    Unmatched(String),
}

/// Matches ledger outputs to entries and records payouts.
pub struct PaymentReconciler<S, L: ?Sized> {
    store: Arc<S>,
    ledger: Arc<L>,
}

impl<S, L> PaymentReconciler<S, L>
where
    S: PeriodStore + EntryStore + PayoutStore + 'static,
    L: LedgerClient + ?Sized,
{
    pub fn new(store: Arc<S>, ledger: Arc<L>) -> Self {
        Self { store, ledger }
    }

    /// Reconcile `transaction_id` against the entries of `period`.
    pub async fn reconcile(
        &self,
        period: PeriodKey,
        transaction_id: &str,
        currency: Currency,
    ) -> Result<ReconcileReport, AppMineError> {
        let store = Arc::clone(&self.store);
        let known = tokio::task::spawn_blocking(move || store.get_period(period))
            .await
            .map_err(|e| AppMineError::Task(e.to_string()))??;
        if known.is_none() {
            return Err(AppMineError::PeriodNotFound(period));
        }

        let outputs = self.ledger.transaction_outputs(transaction_id).await?;
        let grouped = group_by_address(&outputs);
        info!(
            period = %period,
            transaction = transaction_id,
            outputs = outputs.len(),
            addresses = grouped.len(),
            "reconciling payouts"
        );

        let mut tasks = JoinSet::new();
        for (address, value) in grouped {
            let store = Arc::clone(&self.store);
            tasks.spawn_blocking(move || match_output(&*store, period, currency, address, value));
        }

        let mut matched = Vec::new();
        let mut unmatched = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(|e| AppMineError::Task(e.to_string()))?? {
                OutputMatch::Matched(record) => matched.push(record),
                OutputMatch::Unmatched(address) => unmatched.push(address),
            }
        }
        matched.sort_by_key(|r| r.entry_id);
        unmatched.sort();

        info!(
            period = %period,
            transaction = transaction_id,
            matched = matched.len(),
            unmatched = unmatched.len(),
            "reconciliation complete"
        );
        Ok(ReconcileReport {
            transaction_id: transaction_id.to_string(),
            matched,
            unmatched,
        })
    }
}

/// Total value per lower-cased address.
fn group_by_address(outputs: &[LedgerOutput]) -> BTreeMap<String, u64> {
    let mut grouped: BTreeMap<String, u64> = BTreeMap::new();
    for output in outputs {
        let total = grouped.entry(output.address.to_lowercase()).or_default();
        *total = total.saturating_add(output.value);
    }
    grouped
}

fn match_output<S>(
    store: &S,
    period: PeriodKey,
    currency: Currency,
    address: String,
    value: u64,
) -> Result<OutputMatch, AppMineError>
where
    S: EntryStore + PayoutStore + ?Sized,
{
    let Some(entry) = store.find_entry_by_address(currency, &address)? else {
        info!(period = %period, %address, value, "no entry for output address");
        return Ok(OutputMatch::Unmatched(address));
    };
    let record = store.upsert_payout(period, entry.id, currency, value)?;
    info!(period = %period, entry = %entry.id, %address, value, %currency, "recorded payout");
    Ok(OutputMatch::Matched(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use appmine_core::error::LedgerError;
    use appmine_core::projection::EntryProjection;
    use appmine_core::types::{Entry, EntryId, Period, PeriodQuery, PeriodSnapshot};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// In-memory store holding one period, a few entries and payout records.
    struct MemoryStore {
        period: PeriodKey,
        entries: Vec<Entry>,
        payouts: Mutex<BTreeMap<(PeriodKey, EntryId), PayoutRecord>>,
        fail_upserts: bool,
    }

    impl MemoryStore {
        fn new(period: PeriodKey, entries: Vec<Entry>) -> Self {
            Self {
                period,
                entries,
                payouts: Mutex::new(BTreeMap::new()),
                fail_upserts: false,
            }
        }
    }

    impl PeriodStore for MemoryStore {
        fn get_period(&self, key: PeriodKey) -> Result<Option<Period>, AppMineError> {
            Ok((key == self.period).then(|| Period::new(key)))
        }

        fn latest_period(&self, _query: &PeriodQuery) -> Result<Option<Period>, AppMineError> {
            Ok(None)
        }

        fn load_snapshot(
            &self,
            _key: PeriodKey,
            _projection: &EntryProjection,
        ) -> Result<Option<PeriodSnapshot>, AppMineError> {
            Ok(None)
        }
    }

    impl EntryStore for MemoryStore {
        fn get_entry(&self, id: EntryId) -> Result<Option<Entry>, AppMineError> {
            Ok(self.entries.iter().find(|e| e.id == id).cloned())
        }

        fn find_entry_by_address(
            &self,
            currency: Currency,
            address: &str,
        ) -> Result<Option<Entry>, AppMineError> {
            Ok(self
                .entries
                .iter()
                .find(|e| e.has_address(currency, address))
                .cloned())
        }
    }

    impl PayoutStore for MemoryStore {
        fn get_payout(
            &self,
            period: PeriodKey,
            entry_id: EntryId,
        ) -> Result<Option<PayoutRecord>, AppMineError> {
            Ok(self.payouts.lock().get(&(period, entry_id)).cloned())
        }

        fn upsert_payout(
            &self,
            period: PeriodKey,
            entry_id: EntryId,
            currency: Currency,
            value: u64,
        ) -> Result<PayoutRecord, AppMineError> {
            if self.fail_upserts {
                return Err(AppMineError::Storage("disk full".into()));
            }
            let mut payouts = self.payouts.lock();
            let record = payouts
                .entry((period, entry_id))
                .or_insert_with(|| PayoutRecord::new(period, entry_id));
            record.set_value(currency, value);
            Ok(record.clone())
        }

        fn payouts_for_period(&self, period: PeriodKey) -> Result<Vec<PayoutRecord>, AppMineError> {
            Ok(self
                .payouts
                .lock()
                .values()
                .filter(|r| r.period == period)
                .cloned()
                .collect())
        }
    }

    /// Ledger that answers every transaction with fixed outputs.
    struct StubLedger(Result<Vec<LedgerOutput>, LedgerError>);

    #[async_trait]
    impl LedgerClient for StubLedger {
        async fn transaction_outputs(
            &self,
            _transaction_id: &str,
        ) -> Result<Vec<LedgerOutput>, LedgerError> {
            self.0.clone()
        }
    }

    fn key() -> PeriodKey {
        PeriodKey::new(4, 2019).unwrap()
    }

    fn output(address: &str, value: u64) -> LedgerOutput {
        LedgerOutput {
            address: address.to_string(),
            value,
        }
    }

    fn entry_x() -> Entry {
        let mut e = Entry::new(EntryId(1), "x");
        e.btc_address = Some("1XAddress".to_string());
        e
    }

    fn reconciler(
        store: MemoryStore,
        outputs: Vec<LedgerOutput>,
    ) -> (Arc<MemoryStore>, PaymentReconciler<MemoryStore, StubLedger>) {
        let store = Arc::new(store);
        let ledger = Arc::new(StubLedger(Ok(outputs)));
        (Arc::clone(&store), PaymentReconciler::new(store, ledger))
    }

    #[tokio::test]
    async fn records_only_registered_addresses() {
        let (store, rec) = reconciler(
            MemoryStore::new(key(), vec![entry_x()]),
            vec![output("1XAddress", 5), output("1YAddress", 3)],
        );

        let report = rec.reconcile(key(), "tx1", Currency::Btc).await.unwrap();
        assert_eq!(report.matched.len(), 1);
        assert_eq!(report.matched[0].btc_payment_value, Some(5));
        assert_eq!(report.unmatched, vec!["1yaddress".to_string()]);

        let records = store.payouts_for_period(key()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entry_id, EntryId(1));
        assert_eq!(records[0].btc_payment_value, Some(5));
    }

    #[tokio::test]
    async fn second_pass_is_idempotent() {
        let (store, rec) = reconciler(
            MemoryStore::new(key(), vec![entry_x()]),
            vec![output("1XAddress", 5), output("1YAddress", 3)],
        );

        rec.reconcile(key(), "tx1", Currency::Btc).await.unwrap();
        rec.reconcile(key(), "tx1", Currency::Btc).await.unwrap();

        let records = store.payouts_for_period(key()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].btc_payment_value, Some(5));
    }

    #[tokio::test]
    async fn address_match_ignores_case_and_sums_repeats() {
        let (store, rec) = reconciler(
            MemoryStore::new(key(), vec![entry_x()]),
            vec![output("1xaddress", 5), output("1XADDRESS", 2)],
        );

        let report = rec.reconcile(key(), "tx1", Currency::Btc).await.unwrap();
        assert_eq!(report.matched.len(), 1);
        assert_eq!(
            store.get_payout(key(), EntryId(1)).unwrap().unwrap().btc_payment_value,
            Some(7)
        );
    }

    #[tokio::test]
    async fn stx_pass_sets_stx_value_only() {
        let mut entry = entry_x();
        entry.stx_address = Some("SP1X".to_string());
        let (store, rec) = reconciler(
            MemoryStore::new(key(), vec![entry]),
            vec![output("SP1X", 9_000_000)],
        );

        rec.reconcile(key(), "tx2", Currency::Stx).await.unwrap();
        let record = store.get_payout(key(), EntryId(1)).unwrap().unwrap();
        assert_eq!(record.stx_payment_value, Some(9_000_000));
        assert_eq!(record.btc_payment_value, None);
    }

    #[tokio::test]
    async fn unknown_period_fails_before_ledger_call() {
        let store = Arc::new(MemoryStore::new(key(), vec![entry_x()]));
        let ledger = Arc::new(StubLedger(Err(LedgerError::Request("unreachable".into()))));
        let rec = PaymentReconciler::new(store, ledger);

        let other = PeriodKey::new(5, 2019).unwrap();
        let err = rec.reconcile(other, "tx1", Currency::Btc).await.unwrap_err();
        assert!(matches!(err, AppMineError::PeriodNotFound(k) if k == other));
    }

    #[tokio::test]
    async fn ledger_failure_aborts_pass() {
        let store = Arc::new(MemoryStore::new(key(), vec![entry_x()]));
        let ledger = Arc::new(StubLedger(Err(LedgerError::Status {
            status: 500,
            body: "oops".into(),
        })));
        let rec = PaymentReconciler::new(Arc::clone(&store), ledger);

        let err = rec.reconcile(key(), "tx1", Currency::Btc).await.unwrap_err();
        assert!(matches!(err, AppMineError::Ledger(LedgerError::Status { status: 500, .. })));
        assert!(store.payouts_for_period(key()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_reported() {
        let mut store = MemoryStore::new(key(), vec![entry_x()]);
        store.fail_upserts = true;
        let (_, rec) = reconciler(store, vec![output("1XAddress", 5)]);

        let err = rec.reconcile(key(), "tx1", Currency::Btc).await.unwrap_err();
        assert!(matches!(err, AppMineError::Storage(_)));
    }

    #[tokio::test]
    async fn works_with_boxed_ledger() {
        let store = Arc::new(MemoryStore::new(key(), vec![entry_x()]));
        let ledger: Arc<dyn LedgerClient> = Arc::new(StubLedger(Ok(vec![output("1XAddress", 1)])));
        let rec = PaymentReconciler::new(store, ledger);
        let report = rec.reconcile(key(), "tx1", Currency::Btc).await.unwrap();
        assert_eq!(report.matched.len(), 1);
    }

    #[test]
    fn grouping_lowercases_and_sums() {
        let grouped = group_by_address(&[output("AbC", 1), output("abc", 2), output("def", 3)]);
        assert_eq!(grouped.get("abc"), Some(&3));
        assert_eq!(grouped.get("def"), Some(&3));
        assert_eq!(grouped.len(), 2);
    }
}
