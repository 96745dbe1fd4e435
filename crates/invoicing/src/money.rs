//! Money primitives.
//!
//! Amounts are integer cents (`u64`). Tax rates are fixed point in hundredths of a
//! percent, so no floating-point arithmetic ever touches money.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use billdesk_core::{DomainError, DomainResult, ValueObject};

/// Tax rate in basis points (hundredths of a percent), `0..=10_000`.
///
/// `TaxRate::from_str("7.5")` is 750 basis points.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct TaxRate(u32);

impl ValueObject for TaxRate {}

impl TaxRate {
    pub const ZERO: TaxRate = TaxRate(0);
    pub const MAX_BASIS_POINTS: u32 = 10_000;

    pub fn from_basis_points(basis_points: u32) -> DomainResult<Self> {
        if basis_points > Self::MAX_BASIS_POINTS {
            return Err(DomainError::validation(format!(
                "tax percent must be between 0 and 100 (got {}.{:02})",
                basis_points / 100,
                basis_points % 100
            )));
        }
        Ok(Self(basis_points))
    }

    pub fn basis_points(self) -> u32 {
        self.0
    }

    /// Tax owed on `subtotal_cents`, rounded half-up to the nearest cent.
    pub fn tax_on(self, subtotal_cents: u64) -> u64 {
        let scaled = subtotal_cents as u128 * self.0 as u128 + 5_000;
        // Never exceeds the subtotal, so the narrowing is lossless.
        (scaled / 10_000) as u64
    }
}

impl TryFrom<u32> for TaxRate {
    type Error = DomainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_basis_points(value)
    }
}

impl From<TaxRate> for u32 {
    fn from(value: TaxRate) -> Self {
        value.0
    }
}

impl FromStr for TaxRate {
    type Err = DomainError;

    /// Parses a decimal percentage such as `"10"`, `"7.5"` or `"0.25"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || DomainError::validation(format!("invalid tax percent: '{s}'"));

        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac.len() > 2 {
            return Err(DomainError::validation(format!(
                "tax percent supports at most two decimal places: '{s}'"
            )));
        }

        let whole: u32 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let hundredths: u32 = match frac.len() {
            0 => 0,
            1 => frac.parse::<u32>().map_err(|_| invalid())? * 10,
            _ => frac.parse().map_err(|_| invalid())?,
        };

        let basis_points = whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(hundredths))
            .ok_or_else(invalid)?;
        Self::from_basis_points(basis_points)
    }
}

impl fmt::Display for TaxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / 100;
        let frac = self.0 % 100;
        if frac == 0 {
            write!(f, "{whole}")
        } else if frac % 10 == 0 {
            write!(f, "{whole}.{}", frac / 10)
        } else {
            write!(f, "{whole}.{frac:02}")
        }
    }
}

/// Formats cents as a dollar amount with thousands separators, e.g. `$1,234.50`.
pub fn format_cents(cents: u64) -> String {
    let dollars = (cents / 100).to_string();
    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, ch) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("${grouped}.{:02}", cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(s: &str) -> TaxRate {
        s.parse().unwrap()
    }

    #[test]
    fn parses_decimal_percentages() {
        assert_eq!(rate("0").basis_points(), 0);
        assert_eq!(rate("10").basis_points(), 1_000);
        assert_eq!(rate("7.5").basis_points(), 750);
        assert_eq!(rate("0.25").basis_points(), 25);
        assert_eq!(rate(".5").basis_points(), 50);
        assert_eq!(rate("100").basis_points(), 10_000);
        assert_eq!(rate(" 8.25 ").basis_points(), 825);
    }

    #[test]
    fn rejects_out_of_range_and_malformed_percentages() {
        for input in ["", ".", "-1", "100.01", "101", "7.125", "abc", "1e2", "4294967295"] {
            let err = input.parse::<TaxRate>().unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "{input:?} accepted");
        }
    }

    #[test]
    fn displays_without_trailing_zeros() {
        assert_eq!(rate("10").to_string(), "10");
        assert_eq!(rate("7.50").to_string(), "7.5");
        assert_eq!(rate("0.05").to_string(), "0.05");
    }

    #[test]
    fn tax_rounds_half_up() {
        assert_eq!(rate("7.5").tax_on(333), 25);
        assert_eq!(rate("10").tax_on(30_000), 3_000);
        assert_eq!(rate("0").tax_on(123_456), 0);
        // 5 * 0.1 = 0.5 cents rounds up; 4 * 0.1 = 0.4 cents rounds down.
        assert_eq!(rate("10").tax_on(5), 1);
        assert_eq!(rate("10").tax_on(4), 0);
        assert_eq!(rate("100").tax_on(u64::MAX), u64::MAX);
    }

    #[test]
    fn basis_point_conversions_validate_range() {
        assert_eq!(u32::from(rate("7.5")), 750);
        assert_eq!(TaxRate::try_from(10_000).unwrap(), rate("100"));
        assert!(TaxRate::try_from(10_001).is_err());
    }

    #[test]
    fn formats_cents_as_dollars() {
        assert_eq!(format_cents(0), "$0.00");
        assert_eq!(format_cents(5), "$0.05");
        assert_eq!(format_cents(38_500), "$385.00");
        assert_eq!(format_cents(123_456_789), "$1,234,567.89");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: rounded tax is within half a cent of the exact value.
            #[test]
            fn tax_is_within_half_a_cent(
                subtotal in 0u64..=i64::MAX as u64,
                bps in 0u32..=TaxRate::MAX_BASIS_POINTS,
            ) {
                let tax = TaxRate::from_basis_points(bps).unwrap().tax_on(subtotal) as u128;
                let exact_times_10k = subtotal as u128 * bps as u128;
                prop_assert!(tax * 10_000 + 5_000 > exact_times_10k);
                prop_assert!(tax * 10_000 <= exact_times_10k + 5_000);
                prop_assert!(tax <= subtotal as u128);
            }

            /// Property: display output parses back to the same rate.
            #[test]
            fn display_parses_back(bps in 0u32..=TaxRate::MAX_BASIS_POINTS) {
                let rate = TaxRate::from_basis_points(bps).unwrap();
                prop_assert_eq!(rate.to_string().parse::<TaxRate>().unwrap(), rate);
            }
        }
    }
}
