//! Integration test suite for AppMine.
//!
//! Exercises the scoring engine against the RocksDB store across several
//! periods, the reconciler end to end with a stub ledger, and numeric
//! properties of the payout path under randomized inputs.

pub mod helpers;
