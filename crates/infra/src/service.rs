//! Application service: the operations the HTTP layer exposes.
//!
//! Every write goes through the [`CommandDispatcher`]; committed events are then
//! applied to the read models before the call returns, so a caller always reads
//! its own writes. Gateway calls happen only after the state they depend on has
//! been persisted.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, warn};

use billdesk_core::{AggregateId, TenantId};
use billdesk_customers::{
    ContactDetails, Customer, CustomerCommand, CustomerId, RegisterCustomer, RemoveCustomer,
    UpdateCustomer,
};
use billdesk_events::{EventEnvelope, InMemoryEventBus};
use billdesk_invoicing::{
    AddLineItem, AttachCheckoutSession, AttachPdf, CreateInvoice, DeleteInvoice, DeliveryOutcome,
    Invoice, InvoiceCommand, InvoiceId, InvoiceNumber, InvoiceStatus, LineItem, LineItemId,
    LineItemPatch, RecordDelivery, RemoveLineItem, TaxRate, TransitionStatus, UpdateInvoiceDetails,
    UpdateLineItem,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::BillingConfig;
use crate::dashboard::{DashboardStats, MonthlyRevenue, monthly_revenue, recent_invoices};
use crate::delivery::{DeliveryGateway, GatewayError, InvoiceDocument};
use crate::event_store::{EventStore, InMemoryEventStore, StoredEvent};
use crate::projections::customers::CUSTOMER_AGGREGATE_TYPE;
use crate::projections::invoices::INVOICE_AGGREGATE_TYPE;
use crate::projections::{
    CustomerReadModel, CustomersProjection, InvoiceReadModel, InvoicesProjection, ProjectionError,
};
use crate::query::{InvoiceListing, InvoiceQuery};
use crate::read_model::InMemoryTenantStore;

pub type SharedEventStore = Arc<dyn EventStore>;
pub type SharedEventBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type CustomerDirectory = CustomersProjection<Arc<InMemoryTenantStore<CustomerId, CustomerReadModel>>>;
pub type InvoiceBook = InvoicesProjection<Arc<InMemoryTenantStore<InvoiceId, InvoiceReadModel>>>;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("read model update failed: {0}")]
    Projection(#[from] ProjectionError),
}

impl ServiceError {
    fn not_found() -> Self {
        ServiceError::Dispatch(DispatchError::NotFound)
    }

    fn invariant(msg: impl Into<String>) -> Self {
        ServiceError::Dispatch(DispatchError::InvariantViolation(msg.into()))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone, Default)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Partial customer update; `None` leaves a field unchanged, an empty phone or
/// address clears it.
#[derive(Debug, Clone, Default)]
pub struct CustomerChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub customer_id: CustomerId,
    pub due_date: Option<NaiveDate>,
    pub tax_rate: TaxRate,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceDetailsPatch {
    pub due_date: Option<NaiveDate>,
    pub tax_rate: Option<TaxRate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

/// A line item mutation and the invoice it left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItemChange {
    pub item: LineItem,
    pub invoice: InvoiceListing,
}

/// Prefilled values for a new invoice form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InvoiceDefaults {
    pub due_date: NaiveDate,
    pub tax_rate: TaxRate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardView {
    #[serde(flatten)]
    pub stats: DashboardStats,
    pub recent_invoices: Vec<InvoiceListing>,
}

pub struct InvoicingService {
    dispatcher: CommandDispatcher<SharedEventStore, SharedEventBus>,
    customers: CustomerDirectory,
    invoices: InvoiceBook,
    gateway: Arc<dyn DeliveryGateway>,
    /// Serializes number assignment so two creations never read the same count.
    numbering: Mutex<()>,
    config: BillingConfig,
    clock: Clock,
}

impl core::fmt::Debug for InvoicingService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InvoicingService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl InvoicingService {
    pub fn new(
        store: SharedEventStore,
        bus: SharedEventBus,
        gateway: Arc<dyn DeliveryGateway>,
        config: &BillingConfig,
    ) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            customers: CustomersProjection::new(Arc::new(InMemoryTenantStore::new())),
            invoices: InvoicesProjection::new(Arc::new(InMemoryTenantStore::new())),
            gateway,
            numbering: Mutex::new(()),
            config: config.clone(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Fully in-memory wiring.
    pub fn in_memory(gateway: Arc<dyn DeliveryGateway>, config: &BillingConfig) -> Self {
        Self::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            gateway,
            config,
        )
    }

    /// Replace the wall clock used to timestamp commands.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn event_bus(&self) -> &SharedEventBus {
        self.dispatcher.bus()
    }

    // -- customers ---------------------------------------------------------

    pub fn register_customer(&self, tenant_id: TenantId, input: NewCustomer) -> ServiceResult<CustomerReadModel> {
        let customer_id = CustomerId::new(AggregateId::new());
        let command = CustomerCommand::RegisterCustomer(RegisterCustomer {
            tenant_id,
            customer_id,
            name: input.name,
            email: input.email,
            contact: Some(ContactDetails {
                phone: input.phone,
                address: input.address,
            }),
            occurred_at: self.now(),
        });
        self.dispatch_customer(tenant_id, customer_id, command)?;
        info!(%tenant_id, %customer_id, "customer registered");
        self.customer(tenant_id, customer_id)
    }

    pub fn update_customer(
        &self,
        tenant_id: TenantId,
        customer_id: CustomerId,
        changes: CustomerChanges,
    ) -> ServiceResult<CustomerReadModel> {
        let command = CustomerCommand::UpdateCustomer(UpdateCustomer {
            tenant_id,
            customer_id,
            name: changes.name,
            email: changes.email,
            phone: changes.phone,
            address: changes.address,
            occurred_at: self.now(),
        });
        self.dispatch_customer(tenant_id, customer_id, command)?;
        self.customer(tenant_id, customer_id)
    }

    pub fn remove_customer(&self, tenant_id: TenantId, customer_id: CustomerId) -> ServiceResult<()> {
        let command = CustomerCommand::RemoveCustomer(RemoveCustomer {
            tenant_id,
            customer_id,
            occurred_at: self.now(),
        });
        self.dispatch_customer(tenant_id, customer_id, command)?;
        info!(%tenant_id, %customer_id, "customer removed");
        Ok(())
    }

    /// An active customer.
    pub fn customer(&self, tenant_id: TenantId, customer_id: CustomerId) -> ServiceResult<CustomerReadModel> {
        self.customers
            .get(tenant_id, &customer_id)
            .filter(|c| !c.removed)
            .ok_or_else(ServiceError::not_found)
    }

    pub fn customers(&self, tenant_id: TenantId, search: Option<&str>) -> Vec<CustomerReadModel> {
        self.customers.directory(tenant_id, search)
    }

    // -- invoice editing ---------------------------------------------------

    pub fn create_invoice(&self, tenant_id: TenantId, input: NewInvoice) -> ServiceResult<InvoiceListing> {
        let _numbering = self
            .numbering
            .lock()
            .map_err(|_| ServiceError::invariant("invoice numbering lock poisoned"))?;
        self.customer(tenant_id, input.customer_id)?;

        let invoice_id = InvoiceId::new(AggregateId::new());
        let invoice_number = InvoiceNumber::sequential(self.invoices.numbers_issued(tenant_id));
        let command = InvoiceCommand::CreateInvoice(CreateInvoice {
            tenant_id,
            invoice_id,
            customer_id: input.customer_id,
            invoice_number: invoice_number.clone(),
            due_date: input.due_date,
            tax_rate: input.tax_rate,
            notes: input.notes,
            occurred_at: self.now(),
        });
        self.dispatch_invoice(tenant_id, invoice_id, command)?;

        info!(%tenant_id, %invoice_id, number = %invoice_number, "invoice created");
        self.invoice(tenant_id, invoice_id)
    }

    pub fn update_details(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        patch: InvoiceDetailsPatch,
    ) -> ServiceResult<InvoiceListing> {
        let command = InvoiceCommand::UpdateInvoiceDetails(UpdateInvoiceDetails {
            tenant_id,
            invoice_id,
            due_date: patch.due_date,
            tax_rate: patch.tax_rate,
            notes: patch.notes,
            occurred_at: self.now(),
        });
        self.dispatch_invoice(tenant_id, invoice_id, command)?;
        self.invoice(tenant_id, invoice_id)
    }

    pub fn add_line_item(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        input: NewLineItem,
    ) -> ServiceResult<LineItemChange> {
        let line_item_id = LineItemId::new(AggregateId::new());
        let command = InvoiceCommand::AddLineItem(AddLineItem {
            tenant_id,
            invoice_id,
            line_item_id,
            description: input.description,
            quantity: input.quantity,
            unit_price_cents: input.unit_price_cents,
            occurred_at: self.now(),
        });
        self.dispatch_invoice(tenant_id, invoice_id, command)?;
        self.line_item_change(tenant_id, invoice_id, line_item_id)
    }

    pub fn update_line_item(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        line_item_id: LineItemId,
        patch: LineItemPatch,
    ) -> ServiceResult<LineItemChange> {
        let command = InvoiceCommand::UpdateLineItem(UpdateLineItem {
            tenant_id,
            invoice_id,
            line_item_id,
            patch,
            occurred_at: self.now(),
        });
        self.dispatch_invoice(tenant_id, invoice_id, command)?;
        self.line_item_change(tenant_id, invoice_id, line_item_id)
    }

    pub fn remove_line_item(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        line_item_id: LineItemId,
    ) -> ServiceResult<InvoiceListing> {
        let command = InvoiceCommand::RemoveLineItem(RemoveLineItem {
            tenant_id,
            invoice_id,
            line_item_id,
            occurred_at: self.now(),
        });
        self.dispatch_invoice(tenant_id, invoice_id, command)?;
        self.invoice(tenant_id, invoice_id)
    }

    /// Deletes the invoice and its line items. The number stays consumed.
    pub fn delete_invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> ServiceResult<()> {
        let command = InvoiceCommand::DeleteInvoice(DeleteInvoice {
            tenant_id,
            invoice_id,
            occurred_at: self.now(),
        });
        self.dispatch_invoice(tenant_id, invoice_id, command)?;
        info!(%tenant_id, %invoice_id, "invoice deleted");
        Ok(())
    }

    // -- lifecycle ---------------------------------------------------------

    pub fn transition(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        to: InvoiceStatus,
    ) -> ServiceResult<InvoiceListing> {
        let command = InvoiceCommand::TransitionStatus(TransitionStatus {
            tenant_id,
            invoice_id,
            to,
            occurred_at: self.now(),
        });
        match self.dispatch_invoice(tenant_id, invoice_id, command) {
            Ok(committed) if !committed.is_empty() => {
                info!(%tenant_id, %invoice_id, status = %to, "invoice status changed");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(%tenant_id, %invoice_id, status = %to, error = %err, "invoice transition rejected");
                return Err(err);
            }
        }
        self.invoice(tenant_id, invoice_id)
    }

    /// The customer opened the invoice.
    pub fn mark_viewed(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> ServiceResult<InvoiceListing> {
        self.transition(tenant_id, invoice_id, InvoiceStatus::Viewed)
    }

    /// Payment was received.
    pub fn mark_paid(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> ServiceResult<InvoiceListing> {
        self.transition(tenant_id, invoice_id, InvoiceStatus::Paid)
    }

    /// Two-phase send: persist `sent` first, then render, email and record the
    /// delivery outcome. Gateway failures are recorded on the invoice, not returned.
    pub fn send_invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> ServiceResult<InvoiceListing> {
        let invoice = self.load_invoice(tenant_id, invoice_id)?;
        // Reminders for invoices already awaiting payment skip the transition.
        if !invoice.status().is_payable() {
            self.transition(tenant_id, invoice_id, InvoiceStatus::Sent)?;
        }
        self.deliver(tenant_id, invoice_id)
    }

    /// Repeat delivery for an invoice whose last attempt failed. Paid and void
    /// invoices are never emailed again.
    pub fn retry_delivery(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> ServiceResult<InvoiceListing> {
        let invoice = self.load_invoice(tenant_id, invoice_id)?;
        if !invoice.status().is_payable() {
            return Err(ServiceError::invariant(format!(
                "cannot deliver a {} invoice",
                invoice.status()
            )));
        }
        if !invoice.delivery_status().is_failed() {
            return Err(ServiceError::invariant("only failed deliveries can be retried"));
        }
        self.deliver(tenant_id, invoice_id)
    }

    /// Create a checkout session and attach it. Nothing is persisted if the
    /// gateway fails.
    pub fn request_payment_link(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> ServiceResult<InvoiceListing> {
        let invoice = self.load_invoice(tenant_id, invoice_id)?;
        if !invoice.status().is_payable() {
            return Err(ServiceError::invariant(format!(
                "cannot request payment for a {} invoice",
                invoice.status()
            )));
        }

        let document = self.document(tenant_id, &invoice)?;
        let session = self.gateway.create_checkout_session(&document).inspect_err(|err| {
            warn!(%tenant_id, %invoice_id, error = %err, "checkout session creation failed");
        })?;

        let command = InvoiceCommand::AttachCheckoutSession(AttachCheckoutSession {
            tenant_id,
            invoice_id,
            session,
            occurred_at: self.now(),
        });
        self.dispatch_invoice(tenant_id, invoice_id, command)?;
        self.invoice(tenant_id, invoice_id)
    }

    /// Render the current state of the invoice and attach the PDF location.
    pub fn attach_pdf(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> ServiceResult<InvoiceListing> {
        let invoice = self.load_invoice(tenant_id, invoice_id)?;
        let document = self.document(tenant_id, &invoice)?;
        let location = self.gateway.render_pdf(&document)?;
        self.store_pdf(tenant_id, invoice_id, location.url)?;
        self.invoice(tenant_id, invoice_id)
    }

    // -- reads -------------------------------------------------------------

    pub fn invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> ServiceResult<InvoiceListing> {
        let invoice = self
            .invoices
            .get(tenant_id, &invoice_id)
            .ok_or_else(ServiceError::not_found)?;
        Ok(self.listing(tenant_id, invoice, self.now()))
    }

    pub fn invoices(&self, tenant_id: TenantId, query: &InvoiceQuery, as_of: DateTime<Utc>) -> Vec<InvoiceListing> {
        query.run(
            self.invoices.list(tenant_id),
            |customer_id| self.customers.get(tenant_id, customer_id),
            as_of,
        )
    }

    pub fn invoice_defaults(&self, today: NaiveDate) -> InvoiceDefaults {
        InvoiceDefaults {
            due_date: self.config.suggested_due_date(today),
            tax_rate: TaxRate::ZERO,
        }
    }

    pub fn dashboard(&self, tenant_id: TenantId, as_of: DateTime<Utc>, recent: usize) -> DashboardView {
        let invoices = self.invoices.list(tenant_id);
        let stats = DashboardStats::compute(&invoices, as_of);
        let recent_invoices = recent_invoices(invoices, recent)
            .into_iter()
            .map(|invoice| self.listing(tenant_id, invoice, as_of))
            .collect();
        DashboardView { stats, recent_invoices }
    }

    pub fn revenue(&self, tenant_id: TenantId, as_of: DateTime<Utc>, months: u32) -> Vec<MonthlyRevenue> {
        monthly_revenue(&self.invoices.list(tenant_id), as_of, months)
    }

    /// Discard a tenant's read models and replay them from the event store.
    ///
    /// Holds the numbering lock throughout, so no invoice is numbered from a
    /// partially replayed count.
    pub fn rebuild_read_models(&self, tenant_id: TenantId) -> ServiceResult<()> {
        let _numbering = self
            .numbering
            .lock()
            .map_err(|_| ServiceError::invariant("invoice numbering lock poisoned"))?;

        let envelopes: Vec<_> = self
            .dispatcher
            .store()
            .load_tenant(tenant_id)
            .map_err(DispatchError::from)?
            .iter()
            .map(StoredEvent::to_envelope)
            .collect();

        self.customers.rebuild_tenant(tenant_id, envelopes.iter().cloned())?;
        self.invoices.rebuild_tenant(tenant_id, envelopes)?;
        info!(%tenant_id, "read models rebuilt");
        Ok(())
    }

    // -- internals ---------------------------------------------------------

    fn dispatch_customer(
        &self,
        tenant_id: TenantId,
        customer_id: CustomerId,
        command: CustomerCommand,
    ) -> ServiceResult<Vec<StoredEvent>> {
        let committed = self.dispatcher.dispatch(
            tenant_id,
            customer_id.0,
            CUSTOMER_AGGREGATE_TYPE,
            command,
            |_, id| Customer::empty(CustomerId::new(id)),
        )?;
        self.project(&committed)?;
        Ok(committed)
    }

    fn dispatch_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        command: InvoiceCommand,
    ) -> ServiceResult<Vec<StoredEvent>> {
        let committed = self.dispatcher.dispatch(
            tenant_id,
            invoice_id.0,
            INVOICE_AGGREGATE_TYPE,
            command,
            |_, id| Invoice::empty(InvoiceId::new(id)),
        )?;
        self.project(&committed)?;
        Ok(committed)
    }

    fn project(&self, committed: &[StoredEvent]) -> ServiceResult<()> {
        for stored in committed {
            let envelope = stored.to_envelope();
            let applied = match envelope.aggregate_type() {
                CUSTOMER_AGGREGATE_TYPE => self.customers.apply_envelope(&envelope),
                INVOICE_AGGREGATE_TYPE => self.invoices.apply_envelope(&envelope),
                _ => Ok(()),
            };
            if let Err(err) = applied {
                warn!(
                    tenant_id = %stored.tenant_id,
                    aggregate_id = %stored.aggregate_id,
                    sequence = stored.sequence_number,
                    error = %err,
                    "projection apply failed"
                );
                return Err(err.into());
            }
        }
        Ok(())
    }

    fn load_invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> ServiceResult<Invoice> {
        let invoice: Invoice = self
            .dispatcher
            .load(tenant_id, invoice_id.0, |_, id| Invoice::empty(InvoiceId::new(id)))?;
        if !invoice.exists() {
            return Err(ServiceError::not_found());
        }
        Ok(invoice)
    }

    fn document(&self, tenant_id: TenantId, invoice: &Invoice) -> ServiceResult<InvoiceDocument> {
        let customer_id = invoice.customer_id().ok_or_else(ServiceError::not_found)?;
        // Removed customers keep receiving the invoices already issued to them.
        let customer = self
            .customers
            .get(tenant_id, &customer_id)
            .ok_or_else(ServiceError::not_found)?;
        InvoiceDocument::from_invoice(invoice, &customer).ok_or_else(ServiceError::not_found)
    }

    fn store_pdf(&self, tenant_id: TenantId, invoice_id: InvoiceId, location: String) -> ServiceResult<()> {
        let command = InvoiceCommand::AttachPdf(AttachPdf {
            tenant_id,
            invoice_id,
            location,
            occurred_at: self.now(),
        });
        self.dispatch_invoice(tenant_id, invoice_id, command)?;
        Ok(())
    }

    /// Steps after the `sent` transition: PDF, email, delivery record.
    fn deliver(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> ServiceResult<InvoiceListing> {
        let invoice = self.load_invoice(tenant_id, invoice_id)?;
        let mut document = self.document(tenant_id, &invoice)?;

        let attempt = self.render_and_send(&mut document);

        if let Some(url) = document.pdf_url.clone() {
            if invoice.pdf_url() != Some(url.as_str()) {
                self.store_pdf(tenant_id, invoice_id, url)?;
            }
        }

        let outcome = match attempt {
            Ok(()) => {
                info!(%tenant_id, %invoice_id, number = %document.number, "invoice delivered");
                DeliveryOutcome::Delivered
            }
            Err(err) => {
                warn!(%tenant_id, %invoice_id, number = %document.number, error = %err, "invoice delivery failed");
                DeliveryOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        };

        let command = InvoiceCommand::RecordDelivery(RecordDelivery {
            tenant_id,
            invoice_id,
            outcome,
            occurred_at: self.now(),
        });
        self.dispatch_invoice(tenant_id, invoice_id, command)?;
        self.invoice(tenant_id, invoice_id)
    }

    fn render_and_send(&self, document: &mut InvoiceDocument) -> Result<(), GatewayError> {
        if document.pdf_url.is_none() {
            let location = self.gateway.render_pdf(document)?;
            document.pdf_url = Some(location.url);
        }
        self.gateway.send_invoice(document, &document.customer_email)
    }

    fn line_item_change(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        line_item_id: LineItemId,
    ) -> ServiceResult<LineItemChange> {
        let invoice = self.invoice(tenant_id, invoice_id)?;
        let item = invoice
            .invoice
            .items
            .iter()
            .find(|item| item.id_typed() == line_item_id)
            .cloned()
            .ok_or_else(ServiceError::not_found)?;
        Ok(LineItemChange { item, invoice })
    }

    fn listing(&self, tenant_id: TenantId, invoice: InvoiceReadModel, as_of: DateTime<Utc>) -> InvoiceListing {
        let customer = self.customers.get(tenant_id, &invoice.customer_id);
        InvoiceListing::new(invoice, customer, as_of)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::DevDeliveryGateway;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn service(clock: DateTime<Utc>) -> InvoicingService {
        let gateway = Arc::new(DevDeliveryGateway::new(
            "https://files.test/invoices",
            "https://checkout.test/pay",
        ));
        let config = BillingConfig {
            default_due_days: 14,
            ..BillingConfig::default()
        };
        InvoicingService::in_memory(gateway, &config).with_clock(move || clock)
    }

    fn acme(service: &InvoicingService, tenant_id: TenantId) -> CustomerReadModel {
        service
            .register_customer(
                tenant_id,
                NewCustomer {
                    name: "Acme".to_string(),
                    email: "billing@acme.test".to_string(),
                    phone: Some("555-0100".to_string()),
                    address: None,
                },
            )
            .unwrap()
    }

    #[test]
    fn defaults_use_configured_due_days() {
        let service = service(at(2024, 3, 1));
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let defaults = service.invoice_defaults(today);
        assert_eq!(defaults.due_date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(defaults.tax_rate, TaxRate::ZERO);
    }

    #[test]
    fn customer_updates_are_read_back() {
        let service = service(at(2024, 3, 1));
        let tenant_id = TenantId::new();
        let registered = acme(&service, tenant_id);
        assert_eq!(registered.phone.as_deref(), Some("555-0100"));

        let updated = service
            .update_customer(
                tenant_id,
                registered.customer_id,
                CustomerChanges {
                    email: Some("ap@acme.test".to_string()),
                    phone: Some(String::new()),
                    ..CustomerChanges::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Acme");
        assert_eq!(updated.email, "ap@acme.test");
        assert_eq!(updated.phone, None);

        assert_eq!(service.customers(tenant_id, Some("AP@")).len(), 1);
        service.remove_customer(tenant_id, registered.customer_id).unwrap();
        assert!(service.customers(tenant_id, None).is_empty());
        assert!(matches!(
            service.customer(tenant_id, registered.customer_id),
            Err(ServiceError::Dispatch(DispatchError::NotFound))
        ));
    }

    #[test]
    fn dashboard_reflects_payments_and_overdue_invoices() {
        let service = service(at(2024, 3, 10));
        let tenant_id = TenantId::new();
        let customer_id = acme(&service, tenant_id).customer_id;

        let create = |due: NaiveDate, cents: i64| {
            let invoice = service
                .create_invoice(
                    tenant_id,
                    NewInvoice {
                        customer_id,
                        due_date: Some(due),
                        tax_rate: TaxRate::ZERO,
                        notes: None,
                    },
                )
                .unwrap();
            let invoice_id = invoice.invoice.invoice_id;
            service
                .add_line_item(
                    tenant_id,
                    invoice_id,
                    NewLineItem {
                        description: "Retainer".to_string(),
                        quantity: 1,
                        unit_price_cents: cents,
                    },
                )
                .unwrap();
            invoice_id
        };

        let paid = create(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(), 40_000);
        let late = create(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(), 7_500);
        let _draft = create(NaiveDate::from_ymd_opt(2024, 4, 30).unwrap(), 100);

        service.send_invoice(tenant_id, paid).unwrap();
        service.mark_paid(tenant_id, paid).unwrap();
        service.send_invoice(tenant_id, late).unwrap();
        service.mark_viewed(tenant_id, late).unwrap();

        let view = service.dashboard(tenant_id, at(2024, 3, 10), 2);
        assert_eq!(view.stats.total_invoices, 3);
        assert_eq!(view.stats.paid_this_month_cents, 40_000);
        assert_eq!(view.stats.unpaid_total_cents, 7_500);
        assert_eq!(view.stats.overdue_count, 1);
        assert_eq!(view.stats.status_counts.get(&InvoiceStatus::Overdue), Some(&1));
        assert_eq!(view.recent_invoices.len(), 2);
        assert_eq!(view.recent_invoices[0].invoice.number.to_string(), "INV-0003");

        let revenue = service.revenue(tenant_id, at(2024, 3, 10), 2);
        assert_eq!(revenue.len(), 2);
        assert_eq!(revenue[0].month, "2024-02");
        assert_eq!(revenue[0].total_cents, 0);
        assert_eq!(revenue[1].total_cents, 40_000);
    }

    #[test]
    fn attach_pdf_renders_the_current_invoice() {
        let service = service(at(2024, 3, 1));
        let tenant_id = TenantId::new();
        let customer_id = acme(&service, tenant_id).customer_id;
        let invoice = service
            .create_invoice(
                tenant_id,
                NewInvoice {
                    customer_id,
                    due_date: Some(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()),
                    tax_rate: TaxRate::ZERO,
                    notes: Some("Net 30".to_string()),
                },
            )
            .unwrap();

        let with_pdf = service.attach_pdf(tenant_id, invoice.invoice.invoice_id).unwrap();
        let url = with_pdf.invoice.pdf_url.unwrap();
        assert!(url.starts_with("https://files.test/invoices/"));
        assert!(url.ends_with("/INV-0001.pdf"));
        assert_eq!(with_pdf.invoice.notes.as_deref(), Some("Net 30"));
    }
}
