//! Invoicing domain module (event-sourced).
//!
//! Invoice computation and status lifecycle, implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage):
//!
//! - [`LineItemLedger`]: the line items of one invoice and their subtotal
//! - [`recompute_totals`]: subtotal, tax and total from a ledger and a [`TaxRate`]
//! - [`InvoiceStatus`]: the lifecycle state machine and the overdue predicate
//! - [`Invoice`]: the aggregate tying them together

pub mod invoice;
pub mod line_item;
pub mod money;
pub mod number;
pub mod status;
pub mod totals;

pub use invoice::{
    AddLineItem, AttachCheckoutSession, AttachPdf, CheckoutSessionAttached, CheckoutSessionRef,
    CreateInvoice, DeleteInvoice, DeliveryOutcome, DeliveryRecorded, DeliveryStatus, Invoice,
    InvoiceCommand, InvoiceCreated, InvoiceDeleted, InvoiceDetailsUpdated, InvoiceEvent, InvoiceId,
    InvoiceStatusChanged, LineItemAdded, LineItemRemoved, LineItemUpdated, PdfAttached,
    RecordDelivery, RemoveLineItem, TransitionStatus, UpdateInvoiceDetails, UpdateLineItem,
};
pub use line_item::{LineItem, LineItemId, LineItemLedger, LineItemPatch, MAX_SUBTOTAL_CENTS};
pub use money::{TaxRate, format_cents};
pub use number::InvoiceNumber;
pub use status::{InvoiceStatus, LifecycleStamp, TransitionOutcome, is_overdue, presented_status};
pub use totals::{InvoiceTotals, recompute_totals};
