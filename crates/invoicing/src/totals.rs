//! Invoice totals derived from a ledger and a tax rate.

use serde::{Deserialize, Serialize};

use crate::line_item::LineItemLedger;
use crate::money::TaxRate;

/// Subtotal, tax and total of an invoice, in cents.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal_cents: u64,
    pub tax_cents: u64,
    pub total_cents: u64,
}

impl InvoiceTotals {
    pub const ZERO: InvoiceTotals = InvoiceTotals {
        subtotal_cents: 0,
        tax_cents: 0,
        total_cents: 0,
    };

    pub fn from_subtotal(subtotal_cents: u64, tax_rate: TaxRate) -> Self {
        let tax_cents = tax_rate.tax_on(subtotal_cents);
        Self {
            subtotal_cents,
            tax_cents,
            total_cents: subtotal_cents.saturating_add(tax_cents),
        }
    }
}

/// The single totals computation used by the aggregate, read models and documents.
pub fn recompute_totals(tax_rate: TaxRate, ledger: &LineItemLedger) -> InvoiceTotals {
    InvoiceTotals::from_subtotal(ledger.subtotal(), tax_rate)
}
