//! Human-readable invoice numbers (`INV-0001`).

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use billdesk_core::{DomainError, ValueObject};

const PREFIX: &str = "INV-";
const MIN_DIGITS: usize = 4;

/// Sequential, tenant-unique invoice number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InvoiceNumber {
    sequence: u64,
}

impl ValueObject for InvoiceNumber {}

impl InvoiceNumber {
    /// The number following `existing` invoices already created for a tenant.
    pub fn sequential(existing: u64) -> Self {
        Self {
            sequence: existing.saturating_add(1),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{:0width$}", self.sequence, width = MIN_DIGITS)
    }
}

impl FromStr for InvoiceNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::validation(format!("invalid invoice number: '{s}'"));
        let digits = s.strip_prefix(PREFIX).ok_or_else(invalid)?;
        if digits.len() < MIN_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let sequence: u64 = digits.parse().map_err(|_| invalid())?;
        if sequence == 0 {
            return Err(invalid());
        }
        let number = Self { sequence };
        // Reject non-canonical padding such as INV-00042.
        if number.to_string() != s {
            return Err(invalid());
        }
        Ok(number)
    }
}

impl TryFrom<String> for InvoiceNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InvoiceNumber> for String {
    fn from(value: InvoiceNumber) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_numbers_are_zero_padded() {
        let numbers: Vec<String> = (0..3).map(|n| InvoiceNumber::sequential(n).to_string()).collect();
        assert_eq!(numbers, ["INV-0001", "INV-0002", "INV-0003"]);
        assert_eq!(InvoiceNumber::sequential(9_999).to_string(), "INV-10000");
    }

    #[test]
    fn parses_canonical_numbers_only() {
        assert_eq!("INV-0042".parse::<InvoiceNumber>().unwrap().sequence(), 42);
        assert_eq!("INV-12345".parse::<InvoiceNumber>().unwrap().sequence(), 12_345);

        for input in ["", "INV-", "INV-42", "inv-0042", "INV-0000", "INV-00042", "INV-00x2"] {
            assert!(input.parse::<InvoiceNumber>().is_err(), "{input:?} accepted");
        }
    }

    #[test]
    fn numbers_order_by_sequence() {
        assert!(InvoiceNumber::sequential(8) < InvoiceNumber::sequential(9_999));
    }
}
