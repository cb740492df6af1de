//! Error types for the AppMine engine.
use thiserror::Error;

use crate::types::{Currency, EntryId, PeriodKey};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    #[error("entry {entry_id} has no rankings")] EmptyRankings { entry_id: EntryId },
    #[error("ranking references unknown entry {entry_id}")] UnknownEntry { entry_id: EntryId },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid month: {0}")] InvalidMonth(u8),
    #[error("period {period} is missing {setting}")] MissingSetting { period: PeriodKey, setting: &'static str },
    #[error("decay rate must be in (0, 1), got {0}")] InvalidDecayRate(f64),
    #[error("decay rate {0} is finer than the 1 ppb resolution")] DecayRateTooFine(f64),
    #[error("budget must not be negative, got {0}")] NegativeBudget(f64),
    #[error("invalid amount: {0}")] InvalidAmount(f64),
    #[error("conversion rate must be positive, got {0}")] InvalidConversionRate(f64),
    #[error("amount overflow")] AmountOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger request failed: {0}")] Request(String),
    #[error("ledger returned {status}: {body}")] Status { status: u16, body: String },
    #[error("malformed ledger response: {0}")] Malformed(String),
}

#[derive(Error, Debug)]
pub enum AppMineError {
    #[error(transparent)] Score(#[from] ScoreError),
    #[error(transparent)] Config(#[from] ConfigError),
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error("period not found: {0}")] PeriodNotFound(PeriodKey),
    #[error("entry not found: {0}")] EntryNotFound(EntryId),
    #[error("{currency} address {address} already belongs to entry {owner}")]
    AddressInUse { currency: Currency, address: String, owner: EntryId },
    #[error("storage: {0}")] Storage(String),
    #[error("task: {0}")] Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_missing_setting() {
        let e = ConfigError::MissingSetting {
            period: PeriodKey { year: 2019, month: 4 },
            setting: "btc_payout_decay",
        };
        assert_eq!(e.to_string(), "period 2019-04 is missing btc_payout_decay");
    }

    #[test]
    fn display_empty_rankings() {
        let e = ScoreError::EmptyRankings { entry_id: EntryId(7) };
        assert_eq!(e.to_string(), "entry 7 has no rankings");
    }

    #[test]
    fn from_config_error_is_transparent() {
        let err: AppMineError = ConfigError::InvalidDecayRate(1.5).into();
        assert_eq!(err.to_string(), "decay rate must be in (0, 1), got 1.5");
        assert!(matches!(err, AppMineError::Config(ConfigError::InvalidDecayRate(_))));
    }

    #[test]
    fn display_address_in_use() {
        let err = AppMineError::AddressInUse {
            currency: Currency::Btc,
            address: "1Shared".into(),
            owner: EntryId(1),
        };
        assert_eq!(err.to_string(), "BTC address 1Shared already belongs to entry 1");
    }

    #[test]
    fn from_ledger_error() {
        let err: AppMineError = LedgerError::Status { status: 503, body: "busy".into() }.into();
        assert_eq!(err.to_string(), "ledger returned 503: busy");
    }
}
