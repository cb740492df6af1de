//! Payment reconciliation against the RocksDB store with a stub ledger.

use std::sync::Arc;

use appmine_core::error::AppMineError;
use appmine_core::traits::PayoutStore;
use appmine_core::types::{Currency, EntryId};
use appmine_node_lib::reconcile::PaymentReconciler;
use appmine_node_lib::storage::Dataset;
use appmine_tests::helpers::*;

fn store_with_x() -> (tempfile::TempDir, Arc<appmine_node_lib::RocksStore>) {
    let (dir, store) = temp_store();
    store
        .import_dataset(&Dataset {
            entries: vec![entry(1, "x")],
            periods: vec![btc_period(key(4, 2019), 1_000.0, 0.5, 5_000.0)],
            reports: vec![],
        })
        .unwrap();
    (dir, Arc::new(store))
}

#[tokio::test]
async fn only_registered_output_is_recorded() {
    let (_dir, store) = store_with_x();
    let ledger = Arc::new(StubLedger {
        outputs: vec![output("1xAddress", 5), output("1yAddress", 3)],
    });
    let reconciler = PaymentReconciler::new(Arc::clone(&store), ledger);

    let report = reconciler.reconcile(key(4, 2019), "tx-a", Currency::Btc).await.unwrap();
    assert_eq!(report.transaction_id, "tx-a");
    assert_eq!(report.matched.len(), 1);
    assert_eq!(report.unmatched, vec!["1yaddress".to_string()]);

    let records = store.payouts_for_period(key(4, 2019)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entry_id, EntryId(1));
    assert_eq!(records[0].btc_payment_value, Some(5));
}

#[tokio::test]
async fn rerun_keeps_one_record_per_entry() {
    let (_dir, store) = store_with_x();
    let ledger = Arc::new(StubLedger {
        outputs: vec![output("1XADDRESS", 5), output("1yAddress", 3)],
    });
    let reconciler = PaymentReconciler::new(Arc::clone(&store), ledger);

    for _ in 0..2 {
        reconciler.reconcile(key(4, 2019), "tx-a", Currency::Btc).await.unwrap();
    }

    let records = store.payouts_for_period(key(4, 2019)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].btc_payment_value, Some(5));
}

#[tokio::test]
async fn btc_and_stx_passes_share_a_record() {
    let (_dir, store) = store_with_x();
    store
        .update_payout_addresses(
            EntryId(1),
            appmine_node_lib::storage::PayoutAddresses {
                btc_address: None,
                stx_address: Some("SP3X".to_string()),
            },
        )
        .unwrap();

    let btc = PaymentReconciler::new(
        Arc::clone(&store),
        Arc::new(StubLedger { outputs: vec![output("1xAddress", 40_000)] }),
    );
    btc.reconcile(key(4, 2019), "tx-btc", Currency::Btc).await.unwrap();

    let stx = PaymentReconciler::new(
        Arc::clone(&store),
        Arc::new(StubLedger { outputs: vec![output("sp3x", 2_000_000)] }),
    );
    stx.reconcile(key(4, 2019), "tx-stx", Currency::Stx).await.unwrap();

    let record = store.get_payout(key(4, 2019), EntryId(1)).unwrap().unwrap();
    assert_eq!(record.btc_payment_value, Some(40_000));
    assert_eq!(record.stx_payment_value, Some(2_000_000));
}

#[tokio::test]
async fn unknown_period_is_rejected() {
    let (_dir, store) = store_with_x();
    let reconciler = PaymentReconciler::new(
        Arc::clone(&store),
        Arc::new(StubLedger { outputs: vec![output("1xAddress", 5)] }),
    );

    let err = reconciler.reconcile(key(5, 2019), "tx-a", Currency::Btc).await.unwrap_err();
    assert!(matches!(err, AppMineError::PeriodNotFound(_)));
    assert!(store.payouts_for_period(key(5, 2019)).unwrap().is_empty());
}

#[tokio::test]
async fn deleting_the_period_removes_recorded_payouts() {
    let (_dir, store) = store_with_x();
    let reconciler = PaymentReconciler::new(
        Arc::clone(&store),
        Arc::new(StubLedger { outputs: vec![output("1xAddress", 5)] }),
    );
    reconciler.reconcile(key(4, 2019), "tx-a", Currency::Btc).await.unwrap();
    store.record_transaction(key(4, 2019), "tx-a").unwrap();

    let summary = store.delete_period(key(4, 2019)).unwrap();
    assert_eq!(summary.payouts, 1);
    assert!(store.get_payout(key(4, 2019), EntryId(1)).unwrap().is_none());
}
