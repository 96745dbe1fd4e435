//! Outbound collaborators: PDF rendering, email delivery and payment checkout.
//!
//! The service only talks to a [`DeliveryGateway`]; [`DevDeliveryGateway`] is the
//! built-in implementation used in development and tests.

use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use billdesk_invoicing::{
    CheckoutSessionRef, Invoice, InvoiceId, InvoiceNumber, InvoiceTotals, TaxRate, format_cents,
    recompute_totals,
};

use crate::projections::CustomerReadModel;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("pdf rendering failed: {0}")]
    Render(String),

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("email delivery failed: {0}")]
    Send(String),

    #[error("checkout session creation failed: {0}")]
    Checkout(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentLine {
    pub description: String,
    pub quantity: u64,
    pub unit_price_cents: u64,
    pub total_cents: u64,
}

/// Printable snapshot of an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceDocument {
    pub invoice_id: InvoiceId,
    pub number: InvoiceNumber,
    pub issued_on: NaiveDate,
    pub due_date: NaiveDate,
    pub customer_name: String,
    pub customer_email: String,
    pub lines: Vec<DocumentLine>,
    pub tax_rate: TaxRate,
    pub totals: InvoiceTotals,
    pub notes: Option<String>,
    pub pdf_url: Option<String>,
}

impl InvoiceDocument {
    /// `None` if the invoice was never created.
    pub fn from_invoice(invoice: &Invoice, customer: &CustomerReadModel) -> Option<Self> {
        let number = invoice.number()?.clone();
        let due_date = invoice.due_date()?;
        let issued_on = invoice.created_at()?.date_naive();

        Some(Self {
            invoice_id: invoice.id_typed(),
            number,
            issued_on,
            due_date,
            customer_name: customer.name.clone(),
            customer_email: customer.email.clone(),
            lines: invoice
                .line_items()
                .iter()
                .map(|item| DocumentLine {
                    description: item.description().to_string(),
                    quantity: item.quantity(),
                    unit_price_cents: item.unit_price_cents(),
                    total_cents: item.total_cents(),
                })
                .collect(),
            tax_rate: invoice.tax_rate(),
            totals: recompute_totals(invoice.tax_rate(), invoice.ledger()),
            notes: invoice.notes().map(str::to_string),
            pdf_url: invoice.pdf_url().map(str::to_string),
        })
    }

    pub fn subject(&self) -> String {
        format!("Invoice {} due {}", self.number, self.due_date)
    }

    /// Plain-text rendering used for email bodies.
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "Invoice {}\nIssued: {}\nDue: {}\nBill to: {} <{}>\n\n",
            self.number, self.issued_on, self.due_date, self.customer_name, self.customer_email
        );
        for line in &self.lines {
            out.push_str(&format!(
                "{} x {} @ {} = {}\n",
                line.quantity,
                line.description,
                format_cents(line.unit_price_cents),
                format_cents(line.total_cents)
            ));
        }
        out.push_str(&format!(
            "\nSubtotal: {}\nTax ({}%): {}\nTotal: {}\n",
            format_cents(self.totals.subtotal_cents),
            self.tax_rate,
            format_cents(self.totals.tax_cents),
            format_cents(self.totals.total_cents)
        ));
        if let Some(notes) = &self.notes {
            out.push_str(&format!("\n{notes}\n"));
        }
        if let Some(url) = &self.pdf_url {
            out.push_str(&format!("\nPDF: {url}\n"));
        }
        out
    }
}

/// Where a rendered PDF can be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentLocation {
    pub url: String,
}

pub trait DeliveryGateway: Send + Sync {
    fn render_pdf(&self, document: &InvoiceDocument) -> Result<DocumentLocation, GatewayError>;

    fn send_invoice(&self, document: &InvoiceDocument, recipient: &str) -> Result<(), GatewayError>;

    fn create_checkout_session(&self, document: &InvoiceDocument) -> Result<CheckoutSessionRef, GatewayError>;
}

/// An email accepted by [`DevDeliveryGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Deterministic gateway: URLs are derived from configured base URLs and emails are
/// kept in memory. Each operation can be switched to fail.
#[derive(Debug)]
pub struct DevDeliveryGateway {
    document_base_url: String,
    checkout_base_url: String,
    outbox: Mutex<Vec<SentMessage>>,
    sessions: AtomicU64,
    fail_render: AtomicBool,
    fail_send: AtomicBool,
    fail_checkout: AtomicBool,
}

impl DevDeliveryGateway {
    pub fn new(document_base_url: impl Into<String>, checkout_base_url: impl Into<String>) -> Self {
        Self {
            document_base_url: document_base_url.into().trim_end_matches('/').to_string(),
            checkout_base_url: checkout_base_url.into().trim_end_matches('/').to_string(),
            outbox: Mutex::new(Vec::new()),
            sessions: AtomicU64::new(0),
            fail_render: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            fail_checkout: AtomicBool::new(false),
        }
    }

    pub fn fail_render(&self, fail: bool) {
        self.fail_render.store(fail, Ordering::SeqCst);
    }

    pub fn fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn fail_checkout(&self, fail: bool) {
        self.fail_checkout.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl DeliveryGateway for DevDeliveryGateway {
    fn render_pdf(&self, document: &InvoiceDocument) -> Result<DocumentLocation, GatewayError> {
        if self.fail_render.load(Ordering::SeqCst) {
            return Err(GatewayError::Render("renderer unavailable".to_string()));
        }
        Ok(DocumentLocation {
            url: format!(
                "{}/{}/{}.pdf",
                self.document_base_url, document.invoice_id, document.number
            ),
        })
    }

    fn send_invoice(&self, document: &InvoiceDocument, recipient: &str) -> Result<(), GatewayError> {
        let recipient = recipient.trim();
        if !recipient.contains('@') {
            return Err(GatewayError::InvalidRecipient(recipient.to_string()));
        }
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(GatewayError::Send("mail relay unavailable".to_string()));
        }

        let message = SentMessage {
            recipient: recipient.to_string(),
            subject: document.subject(),
            body: document.render_text(),
        };
        tracing::info!(to = %message.recipient, subject = %message.subject, "invoice email accepted");
        self.outbox
            .lock()
            .map_err(|_| GatewayError::Send("outbox lock poisoned".to_string()))?
            .push(message);
        Ok(())
    }

    fn create_checkout_session(&self, document: &InvoiceDocument) -> Result<CheckoutSessionRef, GatewayError> {
        if self.fail_checkout.load(Ordering::SeqCst) {
            return Err(GatewayError::Checkout("payment provider unavailable".to_string()));
        }
        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = format!("cs_{}_{n}", document.invoice_id.0.as_uuid().simple());
        Ok(CheckoutSessionRef {
            url: format!("{}/{session_id}", self.checkout_base_url),
            session_id,
        })
    }
}
