//! # appmine-node — Storage, configuration and payment reconciliation.
//!
//! Everything in AppMine that touches the outside world:
//! - [`storage::RocksStore`] — periods, reports, entries and payout records in RocksDB
//! - [`ledger::BlockExplorerClient`] — transaction outputs from a public block explorer
//! - [`reconcile::PaymentReconciler`] — matches ledger outputs to entries and records payouts
//! - [`config::NodeConfig`] — layered configuration

pub mod config;
pub mod ledger;
pub mod reconcile;
pub mod storage;

pub use config::{LedgerConfig, NodeConfig};
pub use ledger::{BlockExplorerClient, LedgerClient};
pub use reconcile::{PaymentReconciler, ReconcileReport};
pub use storage::{Dataset, RocksStore};
