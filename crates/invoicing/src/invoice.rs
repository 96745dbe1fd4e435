use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use billdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use billdesk_customers::CustomerId;
use billdesk_events::Event;

use crate::line_item::{LineItem, LineItemId, LineItemLedger, LineItemPatch};
use crate::money::TaxRate;
use crate::number::InvoiceNumber;
use crate::status::{self, InvoiceStatus, LifecycleStamp, TransitionOutcome};
use crate::totals::{InvoiceTotals, recompute_totals};

/// Invoice identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Hosted checkout session created for an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSessionRef {
    pub session_id: String,
    pub url: String,
}

/// Outcome of the last attempt to deliver an invoice to its customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    NotAttempted,
    Delivered {
        at: DateTime<Utc>,
    },
    Failed {
        at: DateTime<Utc>,
        reason: String,
    },
}

impl DeliveryStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, DeliveryStatus::Failed { .. })
    }
}

/// Delivery result reported by the caller of [`RecordDelivery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed { reason: String },
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    tenant_id: Option<TenantId>,
    customer_id: Option<CustomerId>,
    number: Option<InvoiceNumber>,
    status: InvoiceStatus,
    ledger: LineItemLedger,
    tax_rate: TaxRate,
    totals: InvoiceTotals,
    due_date: Option<NaiveDate>,
    notes: Option<String>,
    pdf_url: Option<String>,
    checkout_session: Option<CheckoutSessionRef>,
    delivery: DeliveryStatus,
    sent_at: Option<DateTime<Utc>>,
    viewed_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            customer_id: None,
            number: None,
            status: InvoiceStatus::Draft,
            ledger: LineItemLedger::new(id),
            tax_rate: TaxRate::ZERO,
            totals: InvoiceTotals::ZERO,
            due_date: None,
            notes: None,
            pdf_url: None,
            checkout_session: None,
            delivery: DeliveryStatus::NotAttempted,
            sent_at: None,
            viewed_at: None,
            paid_at: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn number(&self) -> Option<&InvoiceNumber> {
        self.number.as_ref()
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn ledger(&self) -> &LineItemLedger {
        &self.ledger
    }

    pub fn line_items(&self) -> &[LineItem] {
        self.ledger.items()
    }

    pub fn tax_rate(&self) -> TaxRate {
        self.tax_rate
    }

    pub fn totals(&self) -> InvoiceTotals {
        self.totals
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn pdf_url(&self) -> Option<&str> {
        self.pdf_url.as_deref()
    }

    pub fn checkout_session(&self) -> Option<&CheckoutSessionRef> {
        self.checkout_session.as_ref()
    }

    pub fn delivery_status(&self) -> &DeliveryStatus {
        &self.delivery
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    pub fn viewed_at(&self) -> Option<DateTime<Utc>> {
        self.viewed_at
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Created and not deleted.
    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Paid and void invoices no longer accept edits to items or details.
    pub fn is_locked(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_overdue(&self, as_of: DateTime<Utc>) -> bool {
        match self.due_date {
            Some(due_date) => status::is_overdue(self.status, due_date, as_of),
            None => false,
        }
    }

    pub fn presented_status(&self, as_of: DateTime<Utc>) -> InvoiceStatus {
        match self.due_date {
            Some(due_date) => status::presented_status(self.status, due_date, as_of),
            None => self.status,
        }
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateInvoice.
///
/// `invoice_number` is assigned by the caller from the tenant's invoice count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub invoice_number: InvoiceNumber,
    pub due_date: Option<NaiveDate>,
    pub tax_rate: TaxRate,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateInvoiceDetails.
///
/// Fields left as `None` keep their value. Empty notes clear them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInvoiceDetails {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub due_date: Option<NaiveDate>,
    pub tax_rate: Option<TaxRate>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLineItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLineItem {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub line_item_id: LineItemId,
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLineItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLineItem {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub line_item_id: LineItemId,
    pub patch: LineItemPatch,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveLineItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLineItem {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub line_item_id: LineItemId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransitionStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionStatus {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub to: InvoiceStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachPdf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachPdf {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub location: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachCheckoutSession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachCheckoutSession {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub session: CheckoutSessionRef,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordDelivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDelivery {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub outcome: DeliveryOutcome,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    CreateInvoice(CreateInvoice),
    UpdateInvoiceDetails(UpdateInvoiceDetails),
    AddLineItem(AddLineItem),
    UpdateLineItem(UpdateLineItem),
    RemoveLineItem(RemoveLineItem),
    TransitionStatus(TransitionStatus),
    AttachPdf(AttachPdf),
    AttachCheckoutSession(AttachCheckoutSession),
    RecordDelivery(RecordDelivery),
    DeleteInvoice(DeleteInvoice),
}

/// Event: InvoiceCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub invoice_number: InvoiceNumber,
    pub due_date: NaiveDate,
    pub tax_rate: TaxRate,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceDetailsUpdated (snapshot of the editable details).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDetailsUpdated {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub due_date: NaiveDate,
    pub tax_rate: TaxRate,
    pub notes: Option<String>,
    pub totals: InvoiceTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineItemAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemAdded {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub item: LineItem,
    pub totals: InvoiceTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineItemUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemUpdated {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub item: LineItem,
    pub totals: InvoiceTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineItemRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemRemoved {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub line_item_id: LineItemId,
    pub totals: InvoiceTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceStatusChanged {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub from: InvoiceStatus,
    pub to: InvoiceStatus,
    pub stamp: Option<LifecycleStamp>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PdfAttached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfAttached {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub location: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CheckoutSessionAttached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSessionAttached {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub session: CheckoutSessionRef,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DeliveryRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecorded {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub status: DeliveryStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceDeleted. Carries the cascaded line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDeleted {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub removed_line_items: Vec<LineItemId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceCreated(InvoiceCreated),
    InvoiceDetailsUpdated(InvoiceDetailsUpdated),
    LineItemAdded(LineItemAdded),
    LineItemUpdated(LineItemUpdated),
    LineItemRemoved(LineItemRemoved),
    InvoiceStatusChanged(InvoiceStatusChanged),
    PdfAttached(PdfAttached),
    CheckoutSessionAttached(CheckoutSessionAttached),
    DeliveryRecorded(DeliveryRecorded),
    InvoiceDeleted(InvoiceDeleted),
}

impl InvoiceEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.tenant_id,
            InvoiceEvent::InvoiceDetailsUpdated(e) => e.tenant_id,
            InvoiceEvent::LineItemAdded(e) => e.tenant_id,
            InvoiceEvent::LineItemUpdated(e) => e.tenant_id,
            InvoiceEvent::LineItemRemoved(e) => e.tenant_id,
            InvoiceEvent::InvoiceStatusChanged(e) => e.tenant_id,
            InvoiceEvent::PdfAttached(e) => e.tenant_id,
            InvoiceEvent::CheckoutSessionAttached(e) => e.tenant_id,
            InvoiceEvent::DeliveryRecorded(e) => e.tenant_id,
            InvoiceEvent::InvoiceDeleted(e) => e.tenant_id,
        }
    }

    pub fn invoice_id(&self) -> InvoiceId {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.invoice_id,
            InvoiceEvent::InvoiceDetailsUpdated(e) => e.invoice_id,
            InvoiceEvent::LineItemAdded(e) => e.invoice_id,
            InvoiceEvent::LineItemUpdated(e) => e.invoice_id,
            InvoiceEvent::LineItemRemoved(e) => e.invoice_id,
            InvoiceEvent::InvoiceStatusChanged(e) => e.invoice_id,
            InvoiceEvent::PdfAttached(e) => e.invoice_id,
            InvoiceEvent::CheckoutSessionAttached(e) => e.invoice_id,
            InvoiceEvent::DeliveryRecorded(e) => e.invoice_id,
            InvoiceEvent::InvoiceDeleted(e) => e.invoice_id,
        }
    }
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceCreated(_) => "invoicing.invoice.created",
            InvoiceEvent::InvoiceDetailsUpdated(_) => "invoicing.invoice.details_updated",
            InvoiceEvent::LineItemAdded(_) => "invoicing.invoice.line_item_added",
            InvoiceEvent::LineItemUpdated(_) => "invoicing.invoice.line_item_updated",
            InvoiceEvent::LineItemRemoved(_) => "invoicing.invoice.line_item_removed",
            InvoiceEvent::InvoiceStatusChanged(_) => "invoicing.invoice.status_changed",
            InvoiceEvent::PdfAttached(_) => "invoicing.invoice.pdf_attached",
            InvoiceEvent::CheckoutSessionAttached(_) => "invoicing.invoice.checkout_session_attached",
            InvoiceEvent::DeliveryRecorded(_) => "invoicing.invoice.delivery_recorded",
            InvoiceEvent::InvoiceDeleted(_) => "invoicing.invoice.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.occurred_at,
            InvoiceEvent::InvoiceDetailsUpdated(e) => e.occurred_at,
            InvoiceEvent::LineItemAdded(e) => e.occurred_at,
            InvoiceEvent::LineItemUpdated(e) => e.occurred_at,
            InvoiceEvent::LineItemRemoved(e) => e.occurred_at,
            InvoiceEvent::InvoiceStatusChanged(e) => e.occurred_at,
            InvoiceEvent::PdfAttached(e) => e.occurred_at,
            InvoiceEvent::CheckoutSessionAttached(e) => e.occurred_at,
            InvoiceEvent::DeliveryRecorded(e) => e.occurred_at,
            InvoiceEvent::InvoiceDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceCreated(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.customer_id = Some(e.customer_id);
                self.number = Some(e.invoice_number.clone());
                self.status = InvoiceStatus::Draft;
                self.ledger = LineItemLedger::new(e.invoice_id);
                self.tax_rate = e.tax_rate;
                self.due_date = Some(e.due_date);
                self.notes = e.notes.clone();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            InvoiceEvent::InvoiceDetailsUpdated(e) => {
                self.due_date = Some(e.due_date);
                self.tax_rate = e.tax_rate;
                self.notes = e.notes.clone();
            }
            InvoiceEvent::LineItemAdded(e) => self.ledger.restore(e.item.clone()),
            InvoiceEvent::LineItemUpdated(e) => self.ledger.restore(e.item.clone()),
            InvoiceEvent::LineItemRemoved(e) => {
                let _ = self.ledger.remove_item(e.line_item_id);
            }
            InvoiceEvent::InvoiceStatusChanged(e) => {
                self.status = e.to;
                let slot = match e.stamp {
                    Some(LifecycleStamp::SentAt) => Some(&mut self.sent_at),
                    Some(LifecycleStamp::ViewedAt) => Some(&mut self.viewed_at),
                    Some(LifecycleStamp::PaidAt) => Some(&mut self.paid_at),
                    None => None,
                };
                // Lifecycle timestamps are written once and never cleared.
                if let Some(slot) = slot {
                    if slot.is_none() {
                        *slot = Some(e.occurred_at);
                    }
                }
            }
            InvoiceEvent::PdfAttached(e) => {
                self.pdf_url = Some(e.location.clone());
            }
            InvoiceEvent::CheckoutSessionAttached(e) => {
                self.checkout_session = Some(e.session.clone());
            }
            InvoiceEvent::DeliveryRecorded(e) => {
                self.delivery = e.status.clone();
            }
            InvoiceEvent::InvoiceDeleted(_) => {
                self.ledger.remove_all();
                self.deleted = true;
            }
        }

        self.totals = recompute_totals(self.tax_rate, &self.ledger);
        self.updated_at = Some(event.occurred_at());
        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::CreateInvoice(cmd) => self.handle_create(cmd),
            InvoiceCommand::UpdateInvoiceDetails(cmd) => self.handle_update_details(cmd),
            InvoiceCommand::AddLineItem(cmd) => self.handle_add_line_item(cmd),
            InvoiceCommand::UpdateLineItem(cmd) => self.handle_update_line_item(cmd),
            InvoiceCommand::RemoveLineItem(cmd) => self.handle_remove_line_item(cmd),
            InvoiceCommand::TransitionStatus(cmd) => self.handle_transition(cmd),
            InvoiceCommand::AttachPdf(cmd) => self.handle_attach_pdf(cmd),
            InvoiceCommand::AttachCheckoutSession(cmd) => self.handle_attach_checkout(cmd),
            InvoiceCommand::RecordDelivery(cmd) => self.handle_record_delivery(cmd),
            InvoiceCommand::DeleteInvoice(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Invoice {
    fn ensure_live(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), DomainError> {
        if self.is_locked() {
            return Err(DomainError::invariant(format!(
                "invoice is {} and can no longer be edited",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        let due_date = cmd
            .due_date
            .ok_or_else(|| DomainError::validation("due date is required"))?;

        Ok(vec![InvoiceEvent::InvoiceCreated(InvoiceCreated {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            customer_id: cmd.customer_id,
            invoice_number: cmd.invoice_number.clone(),
            due_date,
            tax_rate: cmd.tax_rate,
            notes: normalize_notes(cmd.notes.as_deref()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_details(&self, cmd: &UpdateInvoiceDetails) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.invoice_id)?;
        self.ensure_editable()?;

        let current_due = self
            .due_date
            .ok_or_else(|| DomainError::invariant("created invoice has no due date"))?;
        let due_date = cmd.due_date.unwrap_or(current_due);
        let tax_rate = cmd.tax_rate.unwrap_or(self.tax_rate);
        let notes = match &cmd.notes {
            Some(notes) => normalize_notes(Some(notes)),
            None => self.notes.clone(),
        };

        if due_date == current_due && tax_rate == self.tax_rate && notes == self.notes {
            return Ok(vec![]);
        }

        Ok(vec![InvoiceEvent::InvoiceDetailsUpdated(InvoiceDetailsUpdated {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            due_date,
            tax_rate,
            notes,
            totals: recompute_totals(tax_rate, &self.ledger),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line_item(&self, cmd: &AddLineItem) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.invoice_id)?;
        self.ensure_editable()?;

        let mut ledger = self.ledger.clone();
        let item = ledger.add_item(
            cmd.line_item_id,
            &cmd.description,
            cmd.quantity,
            cmd.unit_price_cents,
            cmd.occurred_at,
        )?;

        Ok(vec![InvoiceEvent::LineItemAdded(LineItemAdded {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            item,
            totals: recompute_totals(self.tax_rate, &ledger),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_line_item(&self, cmd: &UpdateLineItem) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.invoice_id)?;
        self.ensure_editable()?;

        let mut ledger = self.ledger.clone();
        let item = ledger.update_item(cmd.line_item_id, &cmd.patch)?;
        if self.ledger.get(cmd.line_item_id) == Some(&item) {
            return Ok(vec![]);
        }

        Ok(vec![InvoiceEvent::LineItemUpdated(LineItemUpdated {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            item,
            totals: recompute_totals(self.tax_rate, &ledger),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line_item(&self, cmd: &RemoveLineItem) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.invoice_id)?;
        self.ensure_editable()?;

        let mut ledger = self.ledger.clone();
        ledger.remove_item(cmd.line_item_id)?;

        Ok(vec![InvoiceEvent::LineItemRemoved(LineItemRemoved {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            line_item_id: cmd.line_item_id,
            totals: recompute_totals(self.tax_rate, &ledger),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transition(&self, cmd: &TransitionStatus) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.invoice_id)?;

        match self.status.plan_transition(cmd.to)? {
            TransitionOutcome::Unchanged => Ok(vec![]),
            TransitionOutcome::Changed { stamp } => {
                Ok(vec![InvoiceEvent::InvoiceStatusChanged(InvoiceStatusChanged {
                    tenant_id: cmd.tenant_id,
                    invoice_id: cmd.invoice_id,
                    from: self.status,
                    to: cmd.to,
                    stamp,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }

    fn handle_attach_pdf(&self, cmd: &AttachPdf) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.invoice_id)?;

        let location = cmd.location.trim();
        if location.is_empty() {
            return Err(DomainError::validation("pdf location cannot be empty"));
        }
        if self.pdf_url.as_deref() == Some(location) {
            return Ok(vec![]);
        }

        Ok(vec![InvoiceEvent::PdfAttached(PdfAttached {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            location: location.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_attach_checkout(&self, cmd: &AttachCheckoutSession) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.invoice_id)?;

        if !self.status.is_payable() {
            return Err(DomainError::invariant(format!(
                "cannot request payment for a {} invoice",
                self.status
            )));
        }
        if cmd.session.session_id.trim().is_empty() || cmd.session.url.trim().is_empty() {
            return Err(DomainError::validation("checkout session id and url are required"));
        }

        Ok(vec![InvoiceEvent::CheckoutSessionAttached(CheckoutSessionAttached {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            session: cmd.session.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_delivery(&self, cmd: &RecordDelivery) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.invoice_id)?;

        if self.sent_at.is_none() {
            return Err(DomainError::invariant("invoice has not been sent"));
        }

        let status = match &cmd.outcome {
            DeliveryOutcome::Delivered => DeliveryStatus::Delivered { at: cmd.occurred_at },
            DeliveryOutcome::Failed { reason } => DeliveryStatus::Failed {
                at: cmd.occurred_at,
                reason: reason.clone(),
            },
        };

        Ok(vec![InvoiceEvent::DeliveryRecorded(DeliveryRecorded {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.invoice_id)?;

        let removed_line_items = self.ledger.items().iter().map(LineItem::id_typed).collect();

        Ok(vec![InvoiceEvent::InvoiceDeleted(InvoiceDeleted {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            removed_line_items,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn normalize_notes(notes: Option<&str>) -> Option<String> {
    notes.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_invoice_id() -> InvoiceId {
        InvoiceId::new(AggregateId::new())
    }

    fn test_customer_id() -> CustomerId {
        CustomerId::new(AggregateId::new())
    }

    fn test_item_id() -> LineItemId {
        LineItemId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn due_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
    }

    fn execute(command: InvoiceCommand, invoice: &mut Invoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        let events = invoice.handle(&command)?;
        for event in &events {
            invoice.apply(event);
        }
        Ok(events)
    }

    fn created(tenant_id: TenantId, invoice_id: InvoiceId, tax: &str) -> Invoice {
        let mut invoice = Invoice::empty(invoice_id);
        execute(
            InvoiceCommand::CreateInvoice(CreateInvoice {
                tenant_id,
                invoice_id,
                customer_id: test_customer_id(),
                invoice_number: InvoiceNumber::sequential(0),
                due_date: Some(due_date()),
                tax_rate: tax.parse().unwrap(),
                notes: Some("  Thanks for your business  ".to_string()),
                occurred_at: test_time(),
            }),
            &mut invoice,
        )
        .unwrap();
        invoice
    }

    fn add_item(
        invoice: &mut Invoice,
        description: &str,
        quantity: i64,
        price: i64,
    ) -> Result<LineItemId, DomainError> {
        let line_item_id = test_item_id();
        execute(
            InvoiceCommand::AddLineItem(AddLineItem {
                tenant_id: invoice.tenant_id().unwrap(),
                invoice_id: invoice.id_typed(),
                line_item_id,
                description: description.to_string(),
                quantity,
                unit_price_cents: price,
                occurred_at: test_time(),
            }),
            invoice,
        )?;
        Ok(line_item_id)
    }

    fn transition(
        invoice: &mut Invoice,
        to: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        execute(
            InvoiceCommand::TransitionStatus(TransitionStatus {
                tenant_id: invoice.tenant_id().unwrap(),
                invoice_id: invoice.id_typed(),
                to,
                occurred_at: at,
            }),
            invoice,
        )
    }

    #[test]
    fn create_invoice_starts_as_draft_with_zero_totals() {
        let invoice = created(test_tenant_id(), test_invoice_id(), "10");

        assert_eq!(invoice.status(), InvoiceStatus::Draft);
        assert_eq!(invoice.totals(), InvoiceTotals::ZERO);
        assert_eq!(invoice.number().unwrap().to_string(), "INV-0001");
        assert_eq!(invoice.notes(), Some("Thanks for your business"));
        assert_eq!(invoice.sent_at(), None);
        assert_eq!(invoice.version(), 1);
    }

    #[test]
    fn create_invoice_requires_due_date_and_rejects_duplicates() {
        let tenant_id = test_tenant_id();
        let invoice_id = test_invoice_id();
        let cmd = CreateInvoice {
            tenant_id,
            invoice_id,
            customer_id: test_customer_id(),
            invoice_number: InvoiceNumber::sequential(0),
            due_date: None,
            tax_rate: TaxRate::ZERO,
            notes: None,
            occurred_at: test_time(),
        };
        let err = Invoice::empty(invoice_id)
            .handle(&InvoiceCommand::CreateInvoice(cmd.clone()))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let existing = created(tenant_id, invoice_id, "0");
        let err = existing
            .handle(&InvoiceCommand::CreateInvoice(CreateInvoice {
                due_date: Some(due_date()),
                ..cmd
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn end_to_end_lifecycle() {
        let mut invoice = created(test_tenant_id(), test_invoice_id(), "10");

        add_item(&mut invoice, "Consulting", 3, 10_000).unwrap();
        assert_eq!(
            invoice.totals(),
            InvoiceTotals { subtotal_cents: 30_000, tax_cents: 3_000, total_cents: 33_000 }
        );

        add_item(&mut invoice, "Travel", 1, 5_000).unwrap();
        let expected = InvoiceTotals { subtotal_cents: 35_000, tax_cents: 3_500, total_cents: 38_500 };
        assert_eq!(invoice.totals(), expected);

        let sent_at = test_time() + Duration::hours(1);
        transition(&mut invoice, InvoiceStatus::Sent, sent_at).unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Sent);
        assert_eq!(invoice.sent_at(), Some(sent_at));
        assert_eq!(invoice.totals(), expected);

        let after_due = Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap();
        assert!(invoice.is_overdue(after_due));
        assert_eq!(invoice.presented_status(after_due), InvoiceStatus::Overdue);

        transition(&mut invoice, InvoiceStatus::Paid, after_due).unwrap();
        assert_eq!(invoice.paid_at(), Some(after_due));
        assert!(!invoice.is_overdue(after_due + Duration::days(30)));
        assert_eq!(invoice.totals(), expected);
    }

    #[test]
    fn repeated_transition_is_a_no_op_and_keeps_timestamps() {
        let mut invoice = created(test_tenant_id(), test_invoice_id(), "0");
        let first = test_time() + Duration::hours(1);
        transition(&mut invoice, InvoiceStatus::Sent, first).unwrap();
        let version = invoice.version();

        let events = transition(&mut invoice, InvoiceStatus::Sent, first + Duration::days(1)).unwrap();
        assert!(events.is_empty());
        assert_eq!(invoice.sent_at(), Some(first));
        assert_eq!(invoice.version(), version);
    }

    #[test]
    fn paid_at_is_never_changed_once_set() {
        let mut invoice = created(test_tenant_id(), test_invoice_id(), "0");
        transition(&mut invoice, InvoiceStatus::Sent, test_time()).unwrap();
        let paid_at = test_time() + Duration::days(2);
        transition(&mut invoice, InvoiceStatus::Paid, paid_at).unwrap();

        assert!(transition(&mut invoice, InvoiceStatus::Paid, paid_at + Duration::days(1))
            .unwrap()
            .is_empty());
        for target in [InvoiceStatus::Void, InvoiceStatus::Draft, InvoiceStatus::Overdue] {
            let err = transition(&mut invoice, target, paid_at + Duration::days(3)).unwrap_err();
            assert!(matches!(err, DomainError::InvalidTransition { .. }));
        }
        assert_eq!(invoice.paid_at(), Some(paid_at));
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let mut invoice = created(test_tenant_id(), test_invoice_id(), "0");
        let err = transition(&mut invoice, InvoiceStatus::Paid, test_time()).unwrap_err();
        assert_eq!(err.to_string(), "invalid transition from draft to paid");
        assert_eq!(invoice.status(), InvoiceStatus::Draft);
    }

    #[test]
    fn paid_and_void_invoices_are_locked() {
        for terminal in [InvoiceStatus::Paid, InvoiceStatus::Void] {
            let mut invoice = created(test_tenant_id(), test_invoice_id(), "10");
            let item = add_item(&mut invoice, "Consulting", 1, 1_000).unwrap();
            transition(&mut invoice, InvoiceStatus::Sent, test_time()).unwrap();
            transition(&mut invoice, terminal, test_time()).unwrap();

            let err = add_item(&mut invoice, "Extra", 1, 1).unwrap_err();
            assert!(matches!(err, DomainError::InvariantViolation(_)));

            let err = execute(
                InvoiceCommand::RemoveLineItem(RemoveLineItem {
                    tenant_id: invoice.tenant_id().unwrap(),
                    invoice_id: invoice.id_typed(),
                    line_item_id: item,
                    occurred_at: test_time(),
                }),
                &mut invoice,
            )
            .unwrap_err();
            assert!(matches!(err, DomainError::InvariantViolation(_)));

            let err = execute(
                InvoiceCommand::UpdateInvoiceDetails(UpdateInvoiceDetails {
                    tenant_id: invoice.tenant_id().unwrap(),
                    invoice_id: invoice.id_typed(),
                    due_date: None,
                    tax_rate: Some(TaxRate::ZERO),
                    notes: None,
                    occurred_at: test_time(),
                }),
                &mut invoice,
            )
            .unwrap_err();
            assert!(matches!(err, DomainError::InvariantViolation(_)));
            assert_eq!(invoice.totals().total_cents, 1_100);
        }
    }

    #[test]
    fn tax_rate_change_recomputes_tax_and_total() {
        let mut invoice = created(test_tenant_id(), test_invoice_id(), "10");
        add_item(&mut invoice, "Widget", 1, 333).unwrap();

        let events = execute(
            InvoiceCommand::UpdateInvoiceDetails(UpdateInvoiceDetails {
                tenant_id: invoice.tenant_id().unwrap(),
                invoice_id: invoice.id_typed(),
                due_date: None,
                tax_rate: Some("7.5".parse().unwrap()),
                notes: Some(String::new()),
                occurred_at: test_time(),
            }),
            &mut invoice,
        )
        .unwrap();

        let expected = InvoiceTotals { subtotal_cents: 333, tax_cents: 25, total_cents: 358 };
        assert_eq!(invoice.totals(), expected);
        assert_eq!(invoice.notes(), None);
        match &events[0] {
            InvoiceEvent::InvoiceDetailsUpdated(e) => assert_eq!(e.totals, expected),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn line_item_events_carry_recomputed_totals() {
        let mut invoice = created(test_tenant_id(), test_invoice_id(), "10");
        let item = add_item(&mut invoice, "Consulting", 3, 10_000).unwrap();

        let events = execute(
            InvoiceCommand::UpdateLineItem(UpdateLineItem {
                tenant_id: invoice.tenant_id().unwrap(),
                invoice_id: invoice.id_typed(),
                line_item_id: item,
                patch: LineItemPatch { quantity: Some(1), ..Default::default() },
                occurred_at: test_time(),
            }),
            &mut invoice,
        )
        .unwrap();
        match &events[0] {
            InvoiceEvent::LineItemUpdated(e) => {
                assert_eq!(e.item.total_cents(), 10_000);
                assert_eq!(e.totals, invoice.totals());
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(invoice.totals().total_cents, 11_000);

        execute(
            InvoiceCommand::RemoveLineItem(RemoveLineItem {
                tenant_id: invoice.tenant_id().unwrap(),
                invoice_id: invoice.id_typed(),
                line_item_id: item,
                occurred_at: test_time(),
            }),
            &mut invoice,
        )
        .unwrap();
        assert_eq!(invoice.totals(), InvoiceTotals::ZERO);
    }

    #[test]
    fn unknown_line_item_is_not_found() {
        let mut invoice = created(test_tenant_id(), test_invoice_id(), "0");
        let err = execute(
            InvoiceCommand::UpdateLineItem(UpdateLineItem {
                tenant_id: invoice.tenant_id().unwrap(),
                invoice_id: invoice.id_typed(),
                line_item_id: test_item_id(),
                patch: LineItemPatch { quantity: Some(2), ..Default::default() },
                occurred_at: test_time(),
            }),
            &mut invoice,
        )
        .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn delivery_requires_a_sent_invoice() {
        let mut invoice = created(test_tenant_id(), test_invoice_id(), "0");
        let record = |invoice: &Invoice, outcome| {
            InvoiceCommand::RecordDelivery(RecordDelivery {
                tenant_id: invoice.tenant_id().unwrap(),
                invoice_id: invoice.id_typed(),
                outcome,
                occurred_at: test_time(),
            })
        };

        let err = execute(record(&invoice, DeliveryOutcome::Delivered), &mut invoice).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        transition(&mut invoice, InvoiceStatus::Sent, test_time()).unwrap();
        let failed = record(&invoice, DeliveryOutcome::Failed { reason: "smtp down".to_string() });
        execute(failed, &mut invoice).unwrap();
        assert!(invoice.delivery_status().is_failed());
        assert_eq!(invoice.status(), InvoiceStatus::Sent);

        execute(record(&invoice, DeliveryOutcome::Delivered), &mut invoice).unwrap();
        assert_eq!(invoice.delivery_status(), &DeliveryStatus::Delivered { at: test_time() });
    }

    #[test]
    fn checkout_session_only_for_payable_invoices() {
        let mut invoice = created(test_tenant_id(), test_invoice_id(), "0");
        let attach = |invoice: &Invoice| {
            InvoiceCommand::AttachCheckoutSession(AttachCheckoutSession {
                tenant_id: invoice.tenant_id().unwrap(),
                invoice_id: invoice.id_typed(),
                session: CheckoutSessionRef {
                    session_id: "cs_1".to_string(),
                    url: "https://checkout.test/cs_1".to_string(),
                },
                occurred_at: test_time(),
            })
        };

        let err = execute(attach(&invoice), &mut invoice).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        transition(&mut invoice, InvoiceStatus::Sent, test_time()).unwrap();
        execute(attach(&invoice), &mut invoice).unwrap();
        assert_eq!(invoice.checkout_session().unwrap().session_id, "cs_1");
    }

    #[test]
    fn delete_cascades_line_items_and_hides_invoice() {
        let tenant_id = test_tenant_id();
        let invoice_id = test_invoice_id();
        let mut invoice = created(tenant_id, invoice_id, "10");
        let first = add_item(&mut invoice, "A", 1, 100).unwrap();
        let second = add_item(&mut invoice, "B", 2, 100).unwrap();

        let events = execute(
            InvoiceCommand::DeleteInvoice(DeleteInvoice {
                tenant_id,
                invoice_id,
                occurred_at: test_time(),
            }),
            &mut invoice,
        )
        .unwrap();
        match &events[0] {
            InvoiceEvent::InvoiceDeleted(e) => assert_eq!(e.removed_line_items, vec![first, second]),
            other => panic!("unexpected event {other:?}"),
        }

        assert!(invoice.is_deleted());
        assert!(invoice.line_items().is_empty());
        assert_eq!(invoice.totals(), InvoiceTotals::ZERO);
        assert_eq!(add_item(&mut invoice, "C", 1, 1).unwrap_err(), DomainError::NotFound);
    }

    #[test]
    fn commands_from_another_tenant_are_rejected() {
        let mut invoice = created(test_tenant_id(), test_invoice_id(), "0");
        let err = execute(
            InvoiceCommand::TransitionStatus(TransitionStatus {
                tenant_id: test_tenant_id(),
                invoice_id: invoice.id_typed(),
                to: InvoiceStatus::Sent,
                occurred_at: test_time(),
            }),
            &mut invoice,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("tenant")));
    }

    #[test]
    fn events_survive_serialization() {
        let mut invoice = created(test_tenant_id(), test_invoice_id(), "7.5");
        let events = {
            let line_item_id = test_item_id();
            execute(
                InvoiceCommand::AddLineItem(AddLineItem {
                    tenant_id: invoice.tenant_id().unwrap(),
                    invoice_id: invoice.id_typed(),
                    line_item_id,
                    description: "Widget".to_string(),
                    quantity: 2,
                    unit_price_cents: 450,
                    occurred_at: test_time(),
                }),
                &mut invoice,
            )
            .unwrap()
        };

        let json = serde_json::to_string(&events[0]).unwrap();
        let back: InvoiceEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, events[0]);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Add(i64, i64),
            Update(prop::sample::Index, Option<i64>, Option<i64>),
            Remove(prop::sample::Index),
            Tax(u32),
            Transition(InvoiceStatus),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                4 => (1i64..50, 0i64..100_000).prop_map(|(q, p)| Op::Add(q, p)),
                2 => (any::<prop::sample::Index>(), proptest::option::of(1i64..50), proptest::option::of(0i64..100_000))
                    .prop_map(|(i, q, p)| Op::Update(i, q, p)),
                1 => any::<prop::sample::Index>().prop_map(Op::Remove),
                1 => (0u32..=10_000).prop_map(Op::Tax),
                1 => proptest::sample::select(InvoiceStatus::ALL.to_vec()).prop_map(Op::Transition),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 128,
                ..ProptestConfig::default()
            })]

            /// Property: after any command sequence the stored totals equal a fresh
            /// recomputation, and lifecycle timestamps never move once set.
            #[test]
            fn totals_and_timestamps_stay_consistent(ops in proptest::collection::vec(op(), 1..40)) {
                let tenant_id = test_tenant_id();
                let invoice_id = test_invoice_id();
                let mut invoice = created(tenant_id, invoice_id, "8.25");
                let mut items: Vec<LineItemId> = Vec::new();
                let mut clock = test_time();

                for op in ops {
                    clock += Duration::minutes(1);
                    let before = (invoice.sent_at(), invoice.viewed_at(), invoice.paid_at());
                    let command = match op {
                        Op::Add(quantity, price) => {
                            let line_item_id = test_item_id();
                            items.push(line_item_id);
                            InvoiceCommand::AddLineItem(AddLineItem {
                                tenant_id, invoice_id, line_item_id,
                                description: "Item".to_string(),
                                quantity, unit_price_cents: price, occurred_at: clock,
                            })
                        }
                        Op::Update(index, quantity, price) if !items.is_empty() => {
                            InvoiceCommand::UpdateLineItem(UpdateLineItem {
                                tenant_id, invoice_id,
                                line_item_id: items[index.index(items.len())],
                                patch: LineItemPatch { description: None, quantity, unit_price_cents: price },
                                occurred_at: clock,
                            })
                        }
                        Op::Remove(index) if !items.is_empty() => {
                            InvoiceCommand::RemoveLineItem(RemoveLineItem {
                                tenant_id, invoice_id,
                                line_item_id: items[index.index(items.len())],
                                occurred_at: clock,
                            })
                        }
                        Op::Tax(bps) => InvoiceCommand::UpdateInvoiceDetails(UpdateInvoiceDetails {
                            tenant_id, invoice_id, due_date: None,
                            tax_rate: Some(TaxRate::from_basis_points(bps).unwrap()),
                            notes: None, occurred_at: clock,
                        }),
                        Op::Transition(to) => InvoiceCommand::TransitionStatus(TransitionStatus {
                            tenant_id, invoice_id, to, occurred_at: clock,
                        }),
                        _ => continue,
                    };
                    let _ = execute(command, &mut invoice);

                    prop_assert_eq!(invoice.totals(), recompute_totals(invoice.tax_rate(), invoice.ledger()));
                    let after = (invoice.sent_at(), invoice.viewed_at(), invoice.paid_at());
                    for (b, a) in [(before.0, after.0), (before.1, after.1), (before.2, after.2)] {
                        if b.is_some() {
                            prop_assert_eq!(b, a);
                        }
                    }
                    for item in invoice.line_items() {
                        prop_assert_eq!(item.total_cents(), item.quantity() * item.unit_price_cents());
                    }
                }
            }
        }
    }
}
