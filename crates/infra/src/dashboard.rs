//! Dashboard aggregates over the invoice read model.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use billdesk_invoicing::InvoiceStatus;

use crate::projections::InvoiceReadModel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    /// Totals of invoices paid during the UTC calendar month of `as_of`.
    pub paid_this_month_cents: u64,
    /// Totals of sent, viewed and overdue invoices.
    pub unpaid_total_cents: u64,
    pub total_invoices: u64,
    pub overdue_count: u64,
    /// Invoices per presented status; every status is present.
    pub status_counts: BTreeMap<InvoiceStatus, u64>,
}

impl DashboardStats {
    pub fn compute(invoices: &[InvoiceReadModel], as_of: DateTime<Utc>) -> Self {
        let current = MonthKey::of(as_of);
        let mut status_counts: BTreeMap<InvoiceStatus, u64> =
            InvoiceStatus::ALL.into_iter().map(|s| (s, 0)).collect();

        let mut stats = Self {
            paid_this_month_cents: 0,
            unpaid_total_cents: 0,
            total_invoices: 0,
            overdue_count: 0,
            status_counts: BTreeMap::new(),
        };

        for invoice in invoices.iter().filter(|i| !i.deleted) {
            let total = invoice.totals.total_cents;
            stats.total_invoices += 1;

            if invoice.status == InvoiceStatus::Paid
                && invoice.paid_at.is_some_and(|at| MonthKey::of(at) == current)
            {
                stats.paid_this_month_cents = stats.paid_this_month_cents.saturating_add(total);
            }
            if invoice.status.is_payable() {
                stats.unpaid_total_cents = stats.unpaid_total_cents.saturating_add(total);
            }
            if invoice.is_overdue(as_of) {
                stats.overdue_count += 1;
            }
            *status_counts.entry(invoice.presented_status(as_of)).or_default() += 1;
        }

        stats.status_counts = status_counts;
        stats
    }
}

/// Paid totals for one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyRevenue {
    /// `YYYY-MM`.
    pub month: String,
    pub total_cents: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    fn of(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    fn months_before(self, back: u32) -> Self {
        let index = self.year as i64 * 12 + (self.month as i64 - 1) - back as i64;
        Self {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    fn label(self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

/// Paid totals for the `months` calendar months ending with the month of `as_of`,
/// oldest first. Months without payments are reported as zero.
pub fn monthly_revenue(invoices: &[InvoiceReadModel], as_of: DateTime<Utc>, months: u32) -> Vec<MonthlyRevenue> {
    let current = MonthKey::of(as_of);
    let mut buckets: BTreeMap<MonthKey, u64> =
        (0..months).map(|back| (current.months_before(back), 0)).collect();

    for invoice in invoices.iter().filter(|i| !i.deleted && i.status == InvoiceStatus::Paid) {
        let Some(paid_at) = invoice.paid_at else {
            continue;
        };
        if let Some(bucket) = buckets.get_mut(&MonthKey::of(paid_at)) {
            *bucket = bucket.saturating_add(invoice.totals.total_cents);
        }
    }

    buckets
        .into_iter()
        .map(|(key, total_cents)| MonthlyRevenue {
            month: key.label(),
            total_cents,
        })
        .collect()
}

/// The `limit` most recently created invoices, newest first.
pub fn recent_invoices(mut invoices: Vec<InvoiceReadModel>, limit: usize) -> Vec<InvoiceReadModel> {
    invoices.retain(|i| !i.deleted);
    invoices.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.number.sequence().cmp(&a.number.sequence()))
    });
    invoices.truncate(limit);
    invoices
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use billdesk_core::AggregateId;
    use billdesk_customers::CustomerId;
    use billdesk_invoicing::{DeliveryStatus, InvoiceId, InvoiceNumber, InvoiceTotals, TaxRate};

    use super::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn invoice(seq: u64, status: InvoiceStatus, total: u64, due: NaiveDate, paid_at: Option<DateTime<Utc>>) -> InvoiceReadModel {
        let created_at = at(2024, 1, 1) + chrono::Duration::days(seq as i64);
        InvoiceReadModel {
            invoice_id: InvoiceId::new(AggregateId::new()),
            customer_id: CustomerId::new(AggregateId::new()),
            number: InvoiceNumber::sequential(seq - 1),
            status,
            due_date: due,
            tax_rate: TaxRate::ZERO,
            totals: InvoiceTotals::from_subtotal(total, TaxRate::ZERO),
            notes: None,
            items: vec![],
            pdf_url: None,
            checkout_session: None,
            delivery_status: DeliveryStatus::NotAttempted,
            sent_at: None,
            viewed_at: None,
            paid_at,
            created_at,
            updated_at: created_at,
            deleted: false,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn stats_follow_presented_status() {
        let as_of = at(2024, 3, 20);
        let mut deleted = invoice(6, InvoiceStatus::Sent, 99_999, date(2024, 3, 1), None);
        deleted.deleted = true;
        let invoices = vec![
            invoice(1, InvoiceStatus::Paid, 10_000, date(2024, 3, 1), Some(at(2024, 3, 5))),
            invoice(2, InvoiceStatus::Paid, 20_000, date(2024, 2, 1), Some(at(2024, 2, 28))),
            invoice(3, InvoiceStatus::Sent, 5_000, date(2024, 3, 10), None),
            invoice(4, InvoiceStatus::Viewed, 7_000, date(2024, 3, 30), None),
            invoice(5, InvoiceStatus::Draft, 1_000, date(2024, 3, 1), None),
            deleted,
        ];

        let stats = DashboardStats::compute(&invoices, as_of);
        assert_eq!(stats.paid_this_month_cents, 10_000);
        assert_eq!(stats.unpaid_total_cents, 12_000);
        assert_eq!(stats.total_invoices, 5);
        assert_eq!(stats.overdue_count, 1);
        assert_eq!(stats.status_counts[&InvoiceStatus::Paid], 2);
        assert_eq!(stats.status_counts[&InvoiceStatus::Overdue], 1);
        assert_eq!(stats.status_counts[&InvoiceStatus::Viewed], 1);
        assert_eq!(stats.status_counts[&InvoiceStatus::Sent], 0);
        assert_eq!(stats.status_counts[&InvoiceStatus::Void], 0);
    }

    #[test]
    fn monthly_revenue_is_zero_filled_oldest_first() {
        let invoices = vec![
            invoice(1, InvoiceStatus::Paid, 10_000, date(2024, 1, 1), Some(at(2024, 3, 5))),
            invoice(2, InvoiceStatus::Paid, 2_500, date(2024, 1, 1), Some(at(2024, 3, 6))),
            invoice(3, InvoiceStatus::Paid, 20_000, date(2024, 1, 1), Some(at(2023, 12, 31))),
            invoice(4, InvoiceStatus::Paid, 40_000, date(2024, 1, 1), Some(at(2023, 6, 1))),
        ];

        let revenue = monthly_revenue(&invoices, at(2024, 3, 20), 4);
        let months: Vec<_> = revenue.iter().map(|r| (r.month.as_str(), r.total_cents)).collect();
        assert_eq!(
            months,
            vec![("2023-12", 20_000), ("2024-01", 0), ("2024-02", 0), ("2024-03", 12_500)]
        );
        assert!(monthly_revenue(&invoices, at(2024, 3, 20), 0).is_empty());
    }

    #[test]
    fn recent_invoices_are_newest_first() {
        let invoices = (1..=5)
            .map(|seq| invoice(seq, InvoiceStatus::Draft, 0, date(2024, 3, 1), None))
            .collect();
        let recent: Vec<_> = recent_invoices(invoices, 3)
            .into_iter()
            .map(|i| i.number.to_string())
            .collect();
        assert_eq!(recent, vec!["INV-0005", "INV-0004", "INV-0003"]);
    }
}
