//! Invoice read model (header, items and lifecycle timestamps).

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use billdesk_core::TenantId;
use billdesk_customers::CustomerId;
use billdesk_events::{Event, EventEnvelope};
use billdesk_invoicing::{
    CheckoutSessionRef, DeliveryStatus, InvoiceEvent, InvoiceId, InvoiceNumber, InvoiceStatus,
    InvoiceTotals, LineItem, LifecycleStamp, TaxRate, is_overdue, presented_status,
};

use super::{CursorDecision, ProjectionError, StreamCursors};
use crate::read_model::TenantStore;

pub const INVOICE_AGGREGATE_TYPE: &str = "invoicing.invoice";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceReadModel {
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub number: InvoiceNumber,
    /// Persisted status; see [`InvoiceReadModel::presented_status`] for display.
    pub status: InvoiceStatus,
    pub due_date: NaiveDate,
    pub tax_rate: TaxRate,
    #[serde(flatten)]
    pub totals: InvoiceTotals,
    pub notes: Option<String>,
    pub items: Vec<LineItem>,
    pub pdf_url: Option<String>,
    pub checkout_session: Option<CheckoutSessionRef>,
    pub delivery_status: DeliveryStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted: bool,
}

impl InvoiceReadModel {
    pub fn is_overdue(&self, as_of: DateTime<Utc>) -> bool {
        is_overdue(self.status, self.due_date, as_of)
    }

    pub fn presented_status(&self, as_of: DateTime<Utc>) -> InvoiceStatus {
        presented_status(self.status, self.due_date, as_of)
    }
}

#[derive(Debug)]
pub struct InvoicesProjection<S>
where
    S: TenantStore<InvoiceId, InvoiceReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> InvoicesProjection<S>
where
    S: TenantStore<InvoiceId, InvoiceReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    /// A live (not deleted) invoice.
    pub fn get(&self, tenant_id: TenantId, invoice_id: &InvoiceId) -> Option<InvoiceReadModel> {
        self.store.get(tenant_id, invoice_id).filter(|rm| !rm.deleted)
    }

    /// All live invoices of a tenant, in no particular order.
    pub fn list(&self, tenant_id: TenantId) -> Vec<InvoiceReadModel> {
        self.store
            .list(tenant_id)
            .into_iter()
            .filter(|rm| !rm.deleted)
            .collect()
    }

    /// Invoices ever created for the tenant, deleted ones included.
    pub fn numbers_issued(&self, tenant_id: TenantId) -> u64 {
        self.store.list(tenant_id).len() as u64
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != INVOICE_AGGREGATE_TYPE {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if self.cursors.decide(tenant_id, aggregate_id, seq)? == CursorDecision::Duplicate {
            return Ok(());
        }

        let ev: InvoiceEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        if ev.tenant_id() != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if ev.invoice_id().0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "event invoice_id does not match envelope aggregate_id".to_string(),
            ));
        }

        if let InvoiceEvent::InvoiceCreated(e) = ev {
            self.store.upsert(
                tenant_id,
                e.invoice_id,
                InvoiceReadModel {
                    invoice_id: e.invoice_id,
                    customer_id: e.customer_id,
                    number: e.invoice_number,
                    status: InvoiceStatus::Draft,
                    due_date: e.due_date,
                    tax_rate: e.tax_rate,
                    totals: InvoiceTotals::ZERO,
                    notes: e.notes,
                    items: vec![],
                    pdf_url: None,
                    checkout_session: None,
                    delivery_status: DeliveryStatus::NotAttempted,
                    sent_at: None,
                    viewed_at: None,
                    paid_at: None,
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                    deleted: false,
                },
            );
        } else {
            let invoice_id = ev.invoice_id();
            let mut rm = self
                .store
                .get(tenant_id, &invoice_id)
                .ok_or(ProjectionError::UnknownStream(aggregate_id))?;
            apply_change(&mut rm, ev);
            self.store.upsert(tenant_id, invoice_id, rm);
        }

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }

    /// Replace a tenant's invoices with the result of replaying `envelopes`.
    pub fn rebuild_tenant(
        &self,
        tenant_id: TenantId,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.store.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
        for env in envelopes.into_iter().filter(|e| e.tenant_id() == tenant_id) {
            self.apply_envelope(&env)?;
        }
        Ok(())
    }
}

fn apply_change(rm: &mut InvoiceReadModel, ev: InvoiceEvent) {
    rm.updated_at = ev.occurred_at();

    match ev {
        InvoiceEvent::InvoiceCreated(_) => {}
        InvoiceEvent::InvoiceDetailsUpdated(e) => {
            rm.due_date = e.due_date;
            rm.tax_rate = e.tax_rate;
            rm.notes = e.notes;
            rm.totals = e.totals;
        }
        InvoiceEvent::LineItemAdded(e) => {
            rm.items.push(e.item);
            rm.totals = e.totals;
        }
        InvoiceEvent::LineItemUpdated(e) => {
            match rm.items.iter_mut().find(|i| i.id_typed() == e.item.id_typed()) {
                Some(slot) => *slot = e.item,
                None => rm.items.push(e.item),
            }
            rm.totals = e.totals;
        }
        InvoiceEvent::LineItemRemoved(e) => {
            rm.items.retain(|i| i.id_typed() != e.line_item_id);
            rm.totals = e.totals;
        }
        InvoiceEvent::InvoiceStatusChanged(e) => {
            rm.status = e.to;
            let slot = match e.stamp {
                Some(LifecycleStamp::SentAt) => Some(&mut rm.sent_at),
                Some(LifecycleStamp::ViewedAt) => Some(&mut rm.viewed_at),
                Some(LifecycleStamp::PaidAt) => Some(&mut rm.paid_at),
                None => None,
            };
            if let Some(slot) = slot {
                if slot.is_none() {
                    *slot = Some(e.occurred_at);
                }
            }
        }
        InvoiceEvent::PdfAttached(e) => rm.pdf_url = Some(e.location),
        InvoiceEvent::CheckoutSessionAttached(e) => rm.checkout_session = Some(e.session),
        InvoiceEvent::DeliveryRecorded(e) => rm.delivery_status = e.status,
        InvoiceEvent::InvoiceDeleted(_) => {
            rm.items.clear();
            rm.totals = InvoiceTotals::ZERO;
            rm.deleted = true;
        }
    }
}
