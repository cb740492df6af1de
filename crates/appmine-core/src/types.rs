//! Core records: periods, reviewer reports, rankings, entries, payouts.
//!
//! Configuration values on [`Period`] are kept exactly as entered by the
//! administrator (USD floats, decay fractions). Conversion to fixed-point
//! happens when a payout plan is built, where invalid values are rejected.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::constants::{
    BTC_DECIMALS, MICRO_STX_PER_STX, REPORT_UTC_OFFSET_SECS, SATS_PER_BTC, STX_DECIMALS,
};
use crate::error::ConfigError;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Identity of a scoring period. Ordered chronologically.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct PeriodKey {
    pub year: u16,
    /// Calendar month, `1..=12`.
    pub month: u8,
}

impl PeriodKey {
    /// Build a key, rejecting months outside `1..=12`.
    pub fn new(month: u8, year: u16) -> Result<Self, ConfigError> {
        if !(1..=12).contains(&month) {
            return Err(ConfigError::InvalidMonth(month));
        }
        Ok(Self { year, month })
    }

    /// English month name ("April").
    pub fn month_name(&self) -> &'static str {
        MONTH_NAMES[(self.month.clamp(1, 12) - 1) as usize]
    }

    /// Search window for the period preceding this one.
    ///
    /// January looks at any month of earlier years; every other month looks
    /// at earlier months with a year no later than this one.
    pub fn prior_search(&self) -> PeriodQuery {
        if self.month == 1 {
            PeriodQuery {
                month_before: 13,
                year_at_most: self.year.saturating_sub(1),
            }
        } else {
            PeriodQuery {
                month_before: self.month,
                year_at_most: self.year,
            }
        }
    }

    /// Big-endian storage key: year (2 bytes) then month, so byte order
    /// matches chronological order.
    pub fn to_bytes(&self) -> [u8; 3] {
        let y = self.year.to_be_bytes();
        [y[0], y[1], self.month]
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [y0, y1, month, ..] => Some(Self {
                year: u16::from_be_bytes([*y0, *y1]),
                month: *month,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Filter used to find the most recent period before a given one.
///
/// A stored period matches when `month < month_before` and
/// `year <= year_at_most`; the store returns the latest match by
/// `(year desc, month desc)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeriodQuery {
    pub month_before: u8,
    pub year_at_most: u16,
}

impl PeriodQuery {
    pub fn matches(&self, key: PeriodKey) -> bool {
        key.month < self.month_before && key.year <= self.year_at_most
    }
}

/// Identifier of an entry (application).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reward currencies paid out per period.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default,
    bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    #[default]
    Btc,
    Stx,
}

impl Currency {
    /// Smallest units per whole coin.
    pub fn units_per_coin(&self) -> u64 {
        match self {
            Self::Btc => SATS_PER_BTC,
            Self::Stx => MICRO_STX_PER_STX,
        }
    }

    /// Display precision in decimal places.
    pub fn decimals(&self) -> u32 {
        match self {
            Self::Btc => BTC_DECIMALS,
            Self::Stx => STX_DECIMALS,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Btc => f.write_str("BTC"),
            Self::Stx => f.write_str("STX"),
        }
    }
}

#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    #[default]
    Pending,
    Published,
}

/// One scoring cycle and its payout configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, bincode::Encode, bincode::Decode)]
pub struct Period {
    #[serde(flatten)]
    pub key: PeriodKey,
    pub name: Option<String>,
    #[serde(default)]
    pub status: PeriodStatus,
    /// BTC budget in USD.
    pub btc_payout_total: Option<f64>,
    /// Fraction of the remaining BTC pool given to the next entry.
    pub btc_payout_decay: Option<f64>,
    /// USD per BTC at purchase time.
    pub purchase_conversion_rate: Option<f64>,
    pub purchase_exchange_name: Option<String>,
    /// Unix seconds.
    pub purchased_at: Option<i64>,
    /// STX budget in USD.
    pub stx_payout_total: Option<f64>,
    pub stx_payout_decay: Option<f64>,
    /// USD per STX.
    pub stx_payout_conversion_rate: Option<f64>,
    #[serde(default)]
    pub stx_payout_is_iou: bool,
    /// Ledger transaction that paid out this period's BTC rewards.
    pub btc_transaction_id: Option<String>,
}

impl Period {
    /// A period with no payout configuration.
    pub fn new(key: PeriodKey) -> Self {
        Self {
            key,
            name: None,
            status: PeriodStatus::Pending,
            btc_payout_total: None,
            btc_payout_decay: None,
            purchase_conversion_rate: None,
            purchase_exchange_name: None,
            purchased_at: None,
            stx_payout_total: None,
            stx_payout_decay: None,
            stx_payout_conversion_rate: None,
            stx_payout_is_iou: false,
            btc_transaction_id: None,
        }
    }

    /// "April 2019".
    pub fn human_readable_date(&self) -> String {
        format!("{} {}", self.key.month_name(), self.key.year)
    }

    /// Combined USD budget of both currencies.
    pub fn total_rewards_usd(&self) -> f64 {
        self.btc_payout_total.unwrap_or(0.0) + self.stx_payout_total.unwrap_or(0.0)
    }

    /// Purchase time rendered in the report time zone,
    /// e.g. "March 5, 2019 at 3:04 pm EST".
    pub fn friendly_purchased_at(&self) -> Option<String> {
        let offset = FixedOffset::east_opt(REPORT_UTC_OFFSET_SECS)?;
        let at = DateTime::from_timestamp(self.purchased_at?, 0)?.with_timezone(&offset);
        Some(format!(
            "{} at {} EST",
            at.format("%B %-d, %Y"),
            at.format("%-I:%M %P")
        ))
    }
}

/// A single reviewer's standardized score for one entry.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, bincode::Encode, bincode::Decode)]
pub struct Ranking {
    pub entry_id: EntryId,
    pub standard_score: f64,
}

/// One reviewer's pass over the entries of a period.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, bincode::Encode, bincode::Decode)]
pub struct ReviewerReport {
    /// Assigned by the store; zero until persisted.
    #[serde(default)]
    pub id: u64,
    pub period: PeriodKey,
    pub reviewer_name: String,
    pub rankings: Vec<Ranking>,
}

/// A ranked application. Persists across periods.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Entry {
    pub id: EntryId,
    pub name: String,
    pub website: Option<String>,
    pub btc_address: Option<String>,
    pub stx_address: Option<String>,
    pub slug: Option<String>,
    pub blockchain: Option<String>,
    pub storage_network: Option<String>,
    pub authentication: Option<String>,
    pub category: Option<String>,
    pub contact_email: Option<String>,
    pub access_token: Option<String>,
    pub notes: Option<String>,
    pub status: Option<String>,
}

impl Entry {
    pub fn new(id: EntryId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Self::default()
        }
    }

    /// Registered receiving address for a currency.
    pub fn address(&self, currency: Currency) -> Option<&str> {
        match currency {
            Currency::Btc => self.btc_address.as_deref(),
            Currency::Stx => self.stx_address.as_deref(),
        }
    }

    /// Whether `address` is this entry's receiving address for `currency`.
    /// Both sides are folded with [`str::to_lowercase`], the same folding
    /// the address indexes use.
    pub fn has_address(&self, currency: Currency, address: &str) -> bool {
        self.address(currency)
            .is_some_and(|own| own.to_lowercase() == address.to_lowercase())
    }
}

/// Observed payment to one entry for one period.
///
/// Keyed by `(period, entry_id)`; at most one record per key.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct PayoutRecord {
    pub period: PeriodKey,
    pub entry_id: EntryId,
    /// Satoshis.
    pub btc_payment_value: Option<u64>,
    /// Micro-STX.
    pub stx_payment_value: Option<u64>,
}

impl PayoutRecord {
    pub fn new(period: PeriodKey, entry_id: EntryId) -> Self {
        Self {
            period,
            entry_id,
            btc_payment_value: None,
            stx_payment_value: None,
        }
    }

    pub fn set_value(&mut self, currency: Currency, value: u64) {
        match currency {
            Currency::Btc => self.btc_payment_value = Some(value),
            Currency::Stx => self.stx_payment_value = Some(value),
        }
    }

    pub fn value(&self, currency: Currency) -> Option<u64> {
        match currency {
            Currency::Btc => self.btc_payment_value,
            Currency::Stx => self.stx_payment_value,
        }
    }
}

/// A transaction output reported by the ledger service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LedgerOutput {
    pub address: String,
    /// Smallest currency units.
    pub value: u64,
}

/// A period with its reviewer reports and the (projected) entries they rank.
#[derive(Clone, Debug, PartialEq)]
pub struct PeriodSnapshot {
    pub period: Period,
    pub reports: Vec<ReviewerReport>,
    pub entries: BTreeMap<EntryId, Entry>,
}
