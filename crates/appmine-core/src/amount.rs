//! Fixed-point conversion and display of monetary amounts.
//!
//! USD is carried as micro-dollars, coins as their smallest unit. Floats only
//! appear at the configuration boundary ([`usd_to_micros`]).

use crate::constants::USD_PRECISION;
use crate::error::ConfigError;

/// Convert a USD budget to micro-dollars, rounding to the nearest micro.
///
/// Negative, non-finite and out-of-range values are rejected.
pub fn usd_to_micros(usd: f64) -> Result<u64, ConfigError> {
    if usd.is_nan() || usd.is_infinite() {
        return Err(ConfigError::InvalidAmount(usd));
    }
    if usd < 0.0 {
        return Err(ConfigError::NegativeBudget(usd));
    }
    let micros = (usd * USD_PRECISION as f64).round();
    if micros >= u64::MAX as f64 {
        return Err(ConfigError::AmountOverflow);
    }
    Ok(micros as u64)
}

/// Render micro-dollars as money: `$1,234.56` (half-up to the cent).
pub fn format_usd(micros: u64) -> String {
    let cents = (micros as u128 + (USD_PRECISION as u128 / 200)) / (USD_PRECISION as u128 / 100);
    format!("${}.{:02}", group_thousands(cents / 100), cents % 100)
}

/// Render a smallest-unit amount with a fixed number of decimals,
/// e.g. `format_units(5_500, 8) == "0.00005500"`.
pub fn format_units(value: u64, decimals: u32) -> String {
    let scale = 10u128.pow(decimals);
    let whole = value as u128 / scale;
    let frac = value as u128 % scale;
    if decimals == 0 {
        return group_thousands(whole);
    }
    format!(
        "{}.{:0width$}",
        group_thousands(whole),
        frac,
        width = decimals as usize
    )
}

/// Render a smallest-unit amount rounded half-up to whole coins with
/// thousands separators, e.g. `format_number(1_234_567_890, 6) == "1,235"`.
pub fn format_number(value: u64, decimals: u32) -> String {
    let scale = 10u128.pow(decimals);
    group_thousands((value as u128 + scale / 2) / scale)
}

fn group_thousands(value: u128) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn usd_to_micros_exact_for_whole_dollars() {
        assert_eq!(usd_to_micros(1000.0).unwrap(), 1_000_000_000);
        assert_eq!(usd_to_micros(0.0).unwrap(), 0);
    }

    #[test]
    fn usd_to_micros_rounds_fractions() {
        assert_eq!(usd_to_micros(0.1234567).unwrap(), 123_457);
    }

    #[test]
    fn usd_to_micros_rejects_negative_and_nan() {
        assert_eq!(usd_to_micros(-1.0), Err(ConfigError::NegativeBudget(-1.0)));
        assert!(matches!(usd_to_micros(f64::NAN), Err(ConfigError::InvalidAmount(_))));
        assert!(matches!(
            usd_to_micros(f64::INFINITY),
            Err(ConfigError::InvalidAmount(_))
        ));
        assert_eq!(usd_to_micros(1e20), Err(ConfigError::AmountOverflow));
    }

    #[test]
    fn format_usd_groups_and_rounds() {
        assert_eq!(format_usd(0), "$0.00");
        assert_eq!(format_usd(1_234_560_000), "$1,234.56");
        assert_eq!(format_usd(5_000), "$0.01");
        assert_eq!(format_usd(4_999), "$0.00");
        assert_eq!(format_usd(100_000_000_000), "$100,000.00");
    }

    #[test]
    fn format_units_pads_fraction() {
        assert_eq!(format_units(5_500, 8), "0.00005500");
        assert_eq!(format_units(10_000_000, 8), "0.10000000");
        assert_eq!(format_units(123_456_789_000, 8), "1,234.56789000");
        assert_eq!(format_units(42, 0), "42");
    }

    #[test]
    fn format_number_rounds_to_whole() {
        assert_eq!(format_number(1_234_567_890, 6), "1,235");
        assert_eq!(format_number(499_999, 6), "0");
    }

    proptest! {
        #[test]
        fn grouping_never_changes_digits(v in any::<u64>()) {
            let grouped = group_thousands(v as u128);
            prop_assert_eq!(grouped.replace(',', ""), v.to_string());
        }
    }
}
