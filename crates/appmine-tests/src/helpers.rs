//! Shared fixtures for integration tests.

use async_trait::async_trait;

use appmine_core::error::LedgerError;
use appmine_core::types::{Entry, EntryId, LedgerOutput, Period, PeriodKey, Ranking, ReviewerReport};
use appmine_node_lib::ledger::LedgerClient;
use appmine_node_lib::storage::RocksStore;

/// Period key from month and year; panics on an invalid month.
pub fn key(month: u8, year: u16) -> PeriodKey {
    PeriodKey::new(month, year).unwrap()
}

/// Entry with a website and a BTC address derived from its name.
pub fn entry(id: u64, name: &str) -> Entry {
    let mut e = Entry::new(EntryId(id), name);
    e.website = Some(format!("https://{name}.example/app"));
    e.btc_address = Some(format!("1{name}Address"));
    e.contact_email = Some(format!("maker@{name}.example"));
    e
}

/// Period with only a BTC pool configured.
pub fn btc_period(key: PeriodKey, budget_usd: f64, decay: f64, usd_per_btc: f64) -> Period {
    let mut p = Period::new(key);
    p.btc_payout_total = Some(budget_usd);
    p.btc_payout_decay = Some(decay);
    p.purchase_conversion_rate = Some(usd_per_btc);
    p
}

/// Reviewer report with `(entry_id, standard_score)` pairs; id left for the store.
pub fn report(period: PeriodKey, reviewer: &str, scores: &[(u64, f64)]) -> ReviewerReport {
    ReviewerReport {
        id: 0,
        period,
        reviewer_name: reviewer.to_string(),
        rankings: scores
            .iter()
            .map(|(id, score)| Ranking {
                entry_id: EntryId(*id),
                standard_score: *score,
            })
            .collect(),
    }
}

/// Fresh store in a temporary directory. Keep the directory alive for the
/// lifetime of the store.
pub fn temp_store() -> (tempfile::TempDir, RocksStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(dir.path()).unwrap();
    (dir, store)
}

/// Ledger output shorthand.
pub fn output(address: &str, value: u64) -> LedgerOutput {
    LedgerOutput {
        address: address.to_string(),
        value,
    }
}

/// Ledger that returns the same outputs for every transaction.
pub struct StubLedger {
    pub outputs: Vec<LedgerOutput>,
}

#[async_trait]
impl LedgerClient for StubLedger {
    async fn transaction_outputs(
        &self,
        _transaction_id: &str,
    ) -> Result<Vec<LedgerOutput>, LedgerError> {
        Ok(self.outputs.clone())
    }
}

/// Assert two scores agree to within floating-point noise.
pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-12,
        "expected {expected}, got {actual}"
    );
}
