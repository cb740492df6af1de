//! RocksDB-backed persistent storage for periods, reviewer reports, entries
//! and payout records.
//!
//! Implements [`PeriodStore`], [`EntryStore`] and [`PayoutStore`] over column
//! families. Period keys are stored big-endian (year, month) so iteration
//! order is chronological. Multi-key mutations use an atomic [`WriteBatch`];
//! read-modify-write sequences are serialized by a process-local lock.

use std::path::Path;

use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use tracing::debug;

use appmine_core::error::AppMineError;
use appmine_core::projection::EntryProjection;
use appmine_core::traits::{EntryStore, PayoutStore, PeriodStore};
use appmine_core::types::{
    Currency, Entry, EntryId, PayoutRecord, Period, PeriodKey, PeriodQuery, PeriodSnapshot,
    ReviewerReport,
};

// --- Column family names ---

const CF_PERIODS: &str = "periods";
const CF_REPORTS: &str = "reports";
const CF_ENTRIES: &str = "entries";
const CF_BTC_ADDRESS_INDEX: &str = "btc_address_index";
const CF_STX_ADDRESS_INDEX: &str = "stx_address_index";
const CF_PAYOUTS: &str = "payouts";
const CF_METADATA: &str = "metadata";

/// All column family names.
const ALL_CFS: &[&str] = &[
    CF_PERIODS,
    CF_REPORTS,
    CF_ENTRIES,
    CF_BTC_ADDRESS_INDEX,
    CF_STX_ADDRESS_INDEX,
    CF_PAYOUTS,
    CF_METADATA,
];

// --- Metadata keys ---

const META_NEXT_REPORT_ID: &[u8] = b"next_report_id";

/// Bulk data accepted by [`RocksStore::import_dataset`].
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Dataset {
    pub entries: Vec<Entry>,
    pub periods: Vec<Period>,
    pub reports: Vec<ReviewerReport>,
}

/// Counts of records written by an import.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub entries: usize,
    pub periods: usize,
    pub reports: usize,
}

/// Counts of records removed with a period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub reports: usize,
    pub payouts: usize,
}

/// Payout address fields an entry's maker may change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PayoutAddresses {
    pub btc_address: Option<String>,
    pub stx_address: Option<String>,
}

/// RocksDB-backed persistent storage.
pub struct RocksStore {
    db: DB,
    /// Serializes read-modify-write sequences (upserts, id allocation,
    /// address index maintenance).
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a RocksDB database at the given path.
    ///
    /// Creates all column families if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppMineError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| AppMineError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// Insert or replace a period.
    pub fn put_period(&self, period: &Period) -> Result<(), AppMineError> {
        // Keys built by hand or deserialized skip month validation.
        PeriodKey::new(period.key.month, period.key.year)?;
        let cf = self.cf_handle(CF_PERIODS)?;
        self.db
            .put_cf(&cf, period.key.to_bytes(), encode(period)?)
            .map_err(|e| AppMineError::Storage(e.to_string()))?;
        debug!(period = %period.key, "stored period");
        Ok(())
    }

    /// All stored periods, oldest first.
    pub fn periods(&self) -> Result<Vec<Period>, AppMineError> {
        let cf = self.cf_handle(CF_PERIODS)?;
        self.db
            .iterator_cf(&cf, IteratorMode::Start)
            .map(|item| {
                let (_, value) = item.map_err(|e| AppMineError::Storage(e.to_string()))?;
                decode(&value)
            })
            .collect()
    }

    /// Insert or replace an entry, keeping the address indexes in step.
    ///
    /// An address indexed to another entry is rejected with
    /// [`AppMineError::AddressInUse`].
    pub fn put_entry(&self, entry: &Entry) -> Result<(), AppMineError> {
        let _guard = self.write_lock.lock();
        self.put_entry_locked(entry)
    }

    /// Change an entry's payout addresses. Fields left `None` keep their
    /// current value; no other entry field can be changed this way.
    pub fn update_payout_addresses(
        &self,
        id: EntryId,
        addresses: PayoutAddresses,
    ) -> Result<Entry, AppMineError> {
        let _guard = self.write_lock.lock();
        let mut entry = self.get_entry(id)?.ok_or(AppMineError::EntryNotFound(id))?;
        if let Some(btc) = addresses.btc_address {
            entry.btc_address = Some(btc);
        }
        if let Some(stx) = addresses.stx_address {
            entry.stx_address = Some(stx);
        }
        self.put_entry_locked(&entry)?;
        Ok(entry)
    }

    /// Store a reviewer report under its period.
    ///
    /// The report always gets the next free id; any id it carries is
    /// replaced. Returns the stored report.
    pub fn add_report(&self, mut report: ReviewerReport) -> Result<ReviewerReport, AppMineError> {
        let _guard = self.write_lock.lock();
        if self.get_period(report.period)?.is_none() {
            return Err(AppMineError::PeriodNotFound(report.period));
        }

        let next = self.get_meta_u64(META_NEXT_REPORT_ID)?.max(1);
        report.id = next;

        let cf_reports = self.cf_handle(CF_REPORTS)?;
        let cf_meta = self.cf_handle(CF_METADATA)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(cf_reports, Self::report_key(report.period, report.id), encode(&report)?);
        batch.put_cf(cf_meta, META_NEXT_REPORT_ID, (next + 1).to_le_bytes());
        self.db
            .write(batch)
            .map_err(|e| AppMineError::Storage(e.to_string()))?;

        debug!(period = %report.period, report = report.id, reviewer = %report.reviewer_name, "stored report");
        Ok(report)
    }

    /// Reviewer reports of a period in id order.
    pub fn reports_for_period(&self, key: PeriodKey) -> Result<Vec<ReviewerReport>, AppMineError> {
        self.scan_prefix(CF_REPORTS, &key.to_bytes())?
            .into_iter()
            .map(|(_, value)| decode(&value))
            .collect()
    }

    /// Remember the transaction that paid out a period.
    pub fn record_transaction(
        &self,
        key: PeriodKey,
        transaction_id: &str,
    ) -> Result<Period, AppMineError> {
        let _guard = self.write_lock.lock();
        let mut period = self.get_period(key)?.ok_or(AppMineError::PeriodNotFound(key))?;
        period.btc_transaction_id = Some(transaction_id.to_string());
        self.put_period(&period)?;
        Ok(period)
    }

    /// Delete a period together with its reports and payout records.
    pub fn delete_period(&self, key: PeriodKey) -> Result<DeleteSummary, AppMineError> {
        let _guard = self.write_lock.lock();
        if self.get_period(key)?.is_none() {
            return Err(AppMineError::PeriodNotFound(key));
        }

        let prefix = key.to_bytes();
        let reports = self.scan_prefix(CF_REPORTS, &prefix)?;
        let payouts = self.scan_prefix(CF_PAYOUTS, &prefix)?;

        let cf_periods = self.cf_handle(CF_PERIODS)?;
        let cf_reports = self.cf_handle(CF_REPORTS)?;
        let cf_payouts = self.cf_handle(CF_PAYOUTS)?;
        let mut batch = WriteBatch::default();
        for (k, _) in &reports {
            batch.delete_cf(cf_reports, k);
        }
        for (k, _) in &payouts {
            batch.delete_cf(cf_payouts, k);
        }
        batch.delete_cf(cf_periods, prefix);
        self.db
            .write(batch)
            .map_err(|e| AppMineError::Storage(e.to_string()))?;

        let summary = DeleteSummary {
            reports: reports.len(),
            payouts: payouts.len(),
        };
        tracing::info!(
            period = %key,
            reports = summary.reports,
            payouts = summary.payouts,
            "deleted period"
        );
        Ok(summary)
    }

    /// Write every record of `dataset`: entries, then periods, then reports.
    pub fn import_dataset(&self, dataset: &Dataset) -> Result<ImportSummary, AppMineError> {
        for entry in &dataset.entries {
            self.put_entry(entry)?;
        }
        for period in &dataset.periods {
            self.put_period(period)?;
        }
        for report in &dataset.reports {
            self.add_report(report.clone())?;
        }
        Ok(ImportSummary {
            entries: dataset.entries.len(),
            periods: dataset.periods.len(),
            reports: dataset.reports.len(),
        })
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), AppMineError> {
        self.db
            .flush()
            .map_err(|e| AppMineError::Storage(e.to_string()))
    }

    // --- Internal helpers ---

    fn put_entry_locked(&self, entry: &Entry) -> Result<(), AppMineError> {
        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        let id_key = entry.id.0.to_be_bytes();
        let previous = self.get_entry(entry.id)?;

        let mut batch = WriteBatch::default();
        for currency in [Currency::Btc, Currency::Stx] {
            let cf_index = self.cf_handle(Self::index_cf(currency))?;
            let new = entry.address(currency);
            let new_key = new.map(Self::address_key);
            if let (Some(address), Some(key)) = (new, &new_key) {
                match self.index_owner(cf_index, key)? {
                    Some(owner) if owner != entry.id => {
                        return Err(AppMineError::AddressInUse {
                            currency,
                            address: address.to_string(),
                            owner,
                        });
                    }
                    _ => {}
                }
            }

            let old_key = previous
                .as_ref()
                .and_then(|p| p.address(currency))
                .map(Self::address_key);
            if let Some(old_key) = old_key.filter(|k| Some(k) != new_key.as_ref()) {
                // Only drop index keys this entry owns.
                if self.index_owner(cf_index, &old_key)? == Some(entry.id) {
                    batch.delete_cf(cf_index, old_key);
                }
            }
            if let Some(key) = new_key {
                batch.put_cf(cf_index, key, id_key);
            }
        }
        batch.put_cf(cf_entries, id_key, encode(entry)?);
        self.db
            .write(batch)
            .map_err(|e| AppMineError::Storage(e.to_string()))?;

        debug!(entry = %entry.id, name = %entry.name, "stored entry");
        Ok(())
    }

    /// Entry id an address index key points at.
    fn index_owner(
        &self,
        cf_index: &rocksdb::ColumnFamily,
        key: &[u8],
    ) -> Result<Option<EntryId>, AppMineError> {
        let Some(bytes) = self
            .db
            .get_cf(cf_index, key)
            .map_err(|e| AppMineError::Storage(e.to_string()))?
        else {
            return Ok(None);
        };
        read_u64(&bytes, u64::from_be_bytes)
            .map(|id| Some(EntryId(id)))
            .ok_or_else(|| AppMineError::Storage("invalid address index value length".into()))
    }

    /// Get a u64 from the metadata column family.
    fn get_meta_u64(&self, key: &[u8]) -> Result<u64, AppMineError> {
        let cf = self.cf_handle(CF_METADATA)?;
        match self
            .db
            .get_cf(&cf, key)
            .map_err(|e| AppMineError::Storage(e.to_string()))?
        {
            Some(bytes) => read_u64(&bytes, u64::from_le_bytes)
                .ok_or_else(|| AppMineError::Storage("invalid metadata value length".into())),
            None => Ok(0),
        }
    }

    /// All `(key, value)` pairs whose key starts with `prefix`.
    fn scan_prefix(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>, AppMineError> {
        let cf = self.cf_handle(cf_name)?;
        let mut out = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(|e| AppMineError::Storage(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key, value));
        }
        Ok(out)
    }

    /// Get a column family handle.
    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, AppMineError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| AppMineError::Storage(format!("missing column family: {name}")))
    }

    fn index_cf(currency: Currency) -> &'static str {
        match currency {
            Currency::Btc => CF_BTC_ADDRESS_INDEX,
            Currency::Stx => CF_STX_ADDRESS_INDEX,
        }
    }

    /// Address index key: the address lower-cased, folded the same way as
    /// [`Entry::has_address`].
    fn address_key(address: &str) -> Vec<u8> {
        address.to_lowercase().into_bytes()
    }

    /// Report key: period (3 bytes) || report id (BE).
    fn report_key(period: PeriodKey, id: u64) -> [u8; 11] {
        let mut key = [0u8; 11];
        key[0..3].copy_from_slice(&period.to_bytes());
        key[3..11].copy_from_slice(&id.to_be_bytes());
        key
    }

    /// Payout key: period (3 bytes) || entry id (BE).
    fn payout_key(period: PeriodKey, entry_id: EntryId) -> [u8; 11] {
        Self::report_key(period, entry_id.0)
    }
}

impl PeriodStore for RocksStore {
    fn get_period(&self, key: PeriodKey) -> Result<Option<Period>, AppMineError> {
        let cf = self.cf_handle(CF_PERIODS)?;
        match self
            .db
            .get_cf(&cf, key.to_bytes())
            .map_err(|e| AppMineError::Storage(e.to_string()))?
        {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn latest_period(&self, query: &PeriodQuery) -> Result<Option<Period>, AppMineError> {
        let cf = self.cf_handle(CF_PERIODS)?;
        for item in self.db.iterator_cf(&cf, IteratorMode::End) {
            let (key, value) = item.map_err(|e| AppMineError::Storage(e.to_string()))?;
            let key = PeriodKey::from_bytes(&key)
                .ok_or_else(|| AppMineError::Storage("invalid period key length".into()))?;
            if query.matches(key) {
                return Ok(Some(decode(&value)?));
            }
        }
        Ok(None)
    }

    fn load_snapshot(
        &self,
        key: PeriodKey,
        projection: &EntryProjection,
    ) -> Result<Option<PeriodSnapshot>, AppMineError> {
        let Some(period) = self.get_period(key)? else {
            return Ok(None);
        };
        let reports = self.reports_for_period(key)?;

        let mut entries = std::collections::BTreeMap::new();
        for ranking in reports.iter().flat_map(|r| &r.rankings) {
            if entries.contains_key(&ranking.entry_id) {
                continue;
            }
            // Dangling rankings are left for the engine to report.
            if let Some(entry) = self.get_entry(ranking.entry_id)? {
                entries.insert(entry.id, entry.project(projection));
            }
        }

        Ok(Some(PeriodSnapshot {
            period,
            reports,
            entries,
        }))
    }
}

impl EntryStore for RocksStore {
    fn get_entry(&self, id: EntryId) -> Result<Option<Entry>, AppMineError> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        match self
            .db
            .get_cf(&cf, id.0.to_be_bytes())
            .map_err(|e| AppMineError::Storage(e.to_string()))?
        {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn find_entry_by_address(
        &self,
        currency: Currency,
        address: &str,
    ) -> Result<Option<Entry>, AppMineError> {
        let cf = self.cf_handle(Self::index_cf(currency))?;
        let Some(id) = self.index_owner(cf, &Self::address_key(address))? else {
            return Ok(None);
        };
        let entry = self.get_entry(id)?;
        Ok(entry.filter(|e| e.has_address(currency, address)))
    }
}

impl PayoutStore for RocksStore {
    fn get_payout(
        &self,
        period: PeriodKey,
        entry_id: EntryId,
    ) -> Result<Option<PayoutRecord>, AppMineError> {
        let cf = self.cf_handle(CF_PAYOUTS)?;
        match self
            .db
            .get_cf(&cf, Self::payout_key(period, entry_id))
            .map_err(|e| AppMineError::Storage(e.to_string()))?
        {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn upsert_payout(
        &self,
        period: PeriodKey,
        entry_id: EntryId,
        currency: Currency,
        value: u64,
    ) -> Result<PayoutRecord, AppMineError> {
        let _guard = self.write_lock.lock();
        let mut record = self
            .get_payout(period, entry_id)?
            .unwrap_or_else(|| PayoutRecord::new(period, entry_id));
        record.set_value(currency, value);

        let cf = self.cf_handle(CF_PAYOUTS)?;
        self.db
            .put_cf(&cf, Self::payout_key(period, entry_id), encode(&record)?)
            .map_err(|e| AppMineError::Storage(e.to_string()))?;

        debug!(period = %period, entry = %entry_id, %currency, value, "stored payout");
        Ok(record)
    }

    fn payouts_for_period(&self, period: PeriodKey) -> Result<Vec<PayoutRecord>, AppMineError> {
        self.scan_prefix(CF_PAYOUTS, &period.to_bytes())?
            .into_iter()
            .map(|(_, value)| decode(&value))
            .collect()
    }
}

fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, AppMineError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| AppMineError::Storage(e.to_string()))
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, AppMineError> {
    let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| AppMineError::Storage(e.to_string()))?;
    Ok(value)
}

fn read_u64(bytes: &[u8], from: impl Fn([u8; 8]) -> u64) -> Option<u64> {
    let array: [u8; 8] = bytes.try_into().ok()?;
    Some(from(array))
}
