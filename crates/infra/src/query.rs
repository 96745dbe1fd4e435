//! Filtered, sorted invoice listings over the read models.
//!
//! Listings join each invoice with its customer so that search can match on the
//! customer's name and email as well as the invoice number.

use core::str::FromStr;
use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billdesk_core::DomainError;
use billdesk_customers::CustomerId;
use billdesk_invoicing::InvoiceStatus;

use crate::projections::{CustomerReadModel, InvoiceReadModel};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceSort {
    #[default]
    CreatedAt,
    DueDate,
    Total,
}

impl FromStr for InvoiceSort {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "created_at" => Ok(InvoiceSort::CreatedAt),
            "due_date" => Ok(InvoiceSort::DueDate),
            "total" => Ok(InvoiceSort::Total),
            other => Err(DomainError::validation(format!("unknown sort field: '{other}'"))),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(DomainError::validation(format!("unknown sort order: '{other}'"))),
        }
    }
}

/// Invoice list filter. Every criterion is optional; the default lists everything,
/// newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceQuery {
    /// Matched against the presented status, so `overdue` includes sent and viewed
    /// invoices past their due date.
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<CustomerId>,
    /// Case-insensitive substring of the invoice number, customer name or email.
    pub search: Option<String>,
    pub sort: InvoiceSort,
    pub order: SortOrder,
}

/// One row of an invoice listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceListing {
    #[serde(flatten)]
    pub invoice: InvoiceReadModel,
    pub presented_status: InvoiceStatus,
    pub is_overdue: bool,
    pub customer: Option<CustomerReadModel>,
}

impl InvoiceListing {
    pub fn new(invoice: InvoiceReadModel, customer: Option<CustomerReadModel>, as_of: DateTime<Utc>) -> Self {
        Self {
            presented_status: invoice.presented_status(as_of),
            is_overdue: invoice.is_overdue(as_of),
            invoice,
            customer,
        }
    }
}

impl InvoiceQuery {
    /// Filter and sort `invoices`, resolving customers through `customer_of`.
    pub fn run(
        &self,
        invoices: Vec<InvoiceReadModel>,
        customer_of: impl Fn(&CustomerId) -> Option<CustomerReadModel>,
        as_of: DateTime<Utc>,
    ) -> Vec<InvoiceListing> {
        let needle = self
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut rows: Vec<InvoiceListing> = invoices
            .into_iter()
            .filter(|inv| self.customer_id.is_none_or(|c| inv.customer_id == c))
            .filter(|inv| self.status.is_none_or(|s| inv.presented_status(as_of) == s))
            .map(|inv| {
                let customer = customer_of(&inv.customer_id);
                InvoiceListing::new(inv, customer, as_of)
            })
            .filter(|row| needle.as_deref().is_none_or(|n| matches_search(row, n)))
            .collect();

        rows.sort_by(|a, b| {
            let ordering = compare(self.sort, &a.invoice, &b.invoice);
            match self.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        rows
    }
}

fn matches_search(row: &InvoiceListing, needle: &str) -> bool {
    if row.invoice.number.to_string().to_lowercase().contains(needle) {
        return true;
    }
    row.customer.as_ref().is_some_and(|c| {
        c.name.to_lowercase().contains(needle) || c.email.to_lowercase().contains(needle)
    })
}

fn compare(sort: InvoiceSort, a: &InvoiceReadModel, b: &InvoiceReadModel) -> Ordering {
    let primary = match sort {
        InvoiceSort::CreatedAt => a.created_at.cmp(&b.created_at),
        InvoiceSort::DueDate => a.due_date.cmp(&b.due_date),
        InvoiceSort::Total => a.totals.total_cents.cmp(&b.totals.total_cents),
    };
    primary.then_with(|| a.number.sequence().cmp(&b.number.sequence()))
}
