use axum::http::StatusCode;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Number, Value as JsonValue, json};

use billdesk_core::AggregateId;
use billdesk_customers::CustomerId;
use billdesk_infra::dashboard::MonthlyRevenue;
use billdesk_infra::projections::CustomerReadModel;
use billdesk_infra::query::{InvoiceListing, InvoiceQuery};
use billdesk_infra::service::{
    CustomerChanges, DashboardView, InvoiceDefaults, InvoiceDetailsPatch, LineItemChange,
    NewCustomer, NewLineItem,
};
use billdesk_invoicing::{InvoiceId, InvoiceStatus, LineItem, LineItemId, LineItemPatch, TaxRate};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterCustomerRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl From<RegisterCustomerRequest> for NewCustomer {
    fn from(body: RegisterCustomerRequest) -> Self {
        NewCustomer {
            name: body.name,
            email: body.email,
            phone: body.phone,
            address: body.address,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl From<UpdateCustomerRequest> for CustomerChanges {
    fn from(body: UpdateCustomerRequest) -> Self {
        CustomerChanges {
            name: body.name,
            email: body.email,
            phone: body.phone,
            address: body.address,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub customer_id: String,
    pub due_date: Option<String>, // YYYY-MM-DD
    pub tax_percent: Option<Number>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateInvoiceRequest {
    pub due_date: Option<String>,
    pub tax_percent: Option<Number>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddLineItemRequest {
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl From<AddLineItemRequest> for NewLineItem {
    fn from(body: AddLineItemRequest) -> Self {
        NewLineItem {
            description: body.description,
            quantity: body.quantity,
            unit_price_cents: body.unit_price_cents,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateLineItemRequest {
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price_cents: Option<i64>,
}

impl From<UpdateLineItemRequest> for LineItemPatch {
    fn from(body: UpdateLineItemRequest) -> Self {
        LineItemPatch {
            description: body.description,
            quantity: body.quantity,
            unit_price_cents: body.unit_price_cents,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListInvoicesParams {
    pub status: Option<String>,
    pub customer_id: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

impl ListInvoicesParams {
    pub fn into_query(self) -> Result<InvoiceQuery, axum::response::Response> {
        let mut query = InvoiceQuery::default();
        if let Some(status) = non_empty(self.status) {
            query.status = Some(status.parse::<InvoiceStatus>().map_err(errors::domain_error_to_response)?);
        }
        if let Some(customer_id) = non_empty(self.customer_id) {
            query.customer_id = Some(parse_customer_id(&customer_id)?);
        }
        if let Some(sort) = non_empty(self.sort) {
            query.sort = sort.parse().map_err(errors::domain_error_to_response)?;
        }
        if let Some(order) = non_empty(self.order) {
            query.order = order.parse().map_err(errors::domain_error_to_response)?;
        }
        query.search = non_empty(self.search);
        Ok(query)
    }
}

#[derive(Debug, Deserialize)]
pub struct DashboardParams {
    pub recent: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RevenueParams {
    pub months: Option<u32>,
}

impl CreateInvoiceRequest {
    pub fn due_date(&self) -> Result<Option<NaiveDate>, axum::response::Response> {
        self.due_date.as_deref().map(parse_date).transpose()
    }

    pub fn tax_rate(&self) -> Result<TaxRate, axum::response::Response> {
        Ok(self.tax_percent.as_ref().map(parse_tax_percent).transpose()?.unwrap_or(TaxRate::ZERO))
    }
}

impl UpdateInvoiceRequest {
    pub fn into_patch(self) -> Result<InvoiceDetailsPatch, axum::response::Response> {
        Ok(InvoiceDetailsPatch {
            due_date: self.due_date.as_deref().map(parse_date).transpose()?,
            tax_rate: self.tax_percent.as_ref().map(parse_tax_percent).transpose()?,
            notes: self.notes,
        })
    }
}

// -------------------------
// Parsing helpers
// -------------------------

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_aggregate_id(raw: &str, what: &str) -> Result<AggregateId, axum::response::Response> {
    raw.trim()
        .parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

pub fn parse_customer_id(raw: &str) -> Result<CustomerId, axum::response::Response> {
    parse_aggregate_id(raw, "customer").map(CustomerId::new)
}

pub fn parse_invoice_id(raw: &str) -> Result<InvoiceId, axum::response::Response> {
    parse_aggregate_id(raw, "invoice").map(InvoiceId::new)
}

pub fn parse_line_item_id(raw: &str) -> Result<LineItemId, axum::response::Response> {
    parse_aggregate_id(raw, "line item").map(LineItemId::new)
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, axum::response::Response> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_due_date", "due_date must be YYYY-MM-DD")
    })
}

/// Tax percent arrives as a JSON number such as `7.5`.
pub fn parse_tax_percent(raw: &Number) -> Result<TaxRate, axum::response::Response> {
    raw.to_string().parse().map_err(errors::domain_error_to_response)
}

fn tax_percent_to_json(rate: TaxRate) -> JsonValue {
    let bps = rate.basis_points();
    if bps % 100 == 0 {
        json!(bps / 100)
    } else {
        json!(f64::from(bps) / 100.0)
    }
}

// -------------------------
// Response mapping
// -------------------------

pub fn customer_to_json(rm: CustomerReadModel) -> JsonValue {
    json!({
        "id": rm.customer_id.0.to_string(),
        "name": rm.name,
        "email": rm.email,
        "phone": rm.phone,
        "address": rm.address,
        "registered_at": rm.registered_at,
        "updated_at": rm.updated_at,
        "removed": rm.removed,
    })
}

pub fn line_item_to_json(item: &LineItem) -> JsonValue {
    json!({
        "id": item.id_typed().0.to_string(),
        "description": item.description(),
        "quantity": item.quantity(),
        "unit_price_cents": item.unit_price_cents(),
        "total_cents": item.total_cents(),
    })
}

pub fn invoice_to_json(listing: InvoiceListing) -> JsonValue {
    let rm = listing.invoice;
    json!({
        "id": rm.invoice_id.0.to_string(),
        "number": rm.number.to_string(),
        "customer_id": rm.customer_id.0.to_string(),
        "customer": listing.customer.map(customer_to_json),
        "status": rm.status,
        "presented_status": listing.presented_status,
        "is_overdue": listing.is_overdue,
        "due_date": rm.due_date,
        "tax_percent": tax_percent_to_json(rm.tax_rate),
        "subtotal_cents": rm.totals.subtotal_cents,
        "tax_cents": rm.totals.tax_cents,
        "total_cents": rm.totals.total_cents,
        "notes": rm.notes,
        "items": rm.items.iter().map(line_item_to_json).collect::<Vec<_>>(),
        "pdf_url": rm.pdf_url,
        "checkout_session": rm.checkout_session,
        "delivery_status": rm.delivery_status,
        "sent_at": rm.sent_at,
        "viewed_at": rm.viewed_at,
        "paid_at": rm.paid_at,
        "created_at": rm.created_at,
        "updated_at": rm.updated_at,
    })
}

pub fn line_item_change_to_json(change: LineItemChange) -> JsonValue {
    json!({
        "item": line_item_to_json(&change.item),
        "invoice": invoice_to_json(change.invoice),
    })
}

pub fn defaults_to_json(defaults: InvoiceDefaults) -> JsonValue {
    json!({
        "due_date": defaults.due_date,
        "tax_percent": tax_percent_to_json(defaults.tax_rate),
    })
}

pub fn dashboard_to_json(view: DashboardView) -> JsonValue {
    let stats = view.stats;
    json!({
        "paid_this_month_cents": stats.paid_this_month_cents,
        "unpaid_total_cents": stats.unpaid_total_cents,
        "total_invoices": stats.total_invoices,
        "overdue_count": stats.overdue_count,
        "status_counts": stats
            .status_counts
            .into_iter()
            .map(|(status, count)| (status.to_string(), json!(count)))
            .collect::<serde_json::Map<_, _>>(),
        "recent_invoices": view.recent_invoices.into_iter().map(invoice_to_json).collect::<Vec<_>>(),
    })
}

pub fn revenue_to_json(months: Vec<MonthlyRevenue>) -> JsonValue {
    json!({
        "items": months
            .into_iter()
            .map(|m| json!({ "month": m.month, "total_cents": m.total_cents }))
            .collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_percent_round_trips_through_json_numbers() {
        let rate = parse_tax_percent(&serde_json::from_str::<Number>("7.5").unwrap()).unwrap();
        assert_eq!(rate.basis_points(), 750);
        assert_eq!(tax_percent_to_json(rate), json!(7.5));

        let whole = parse_tax_percent(&serde_json::from_str::<Number>("10").unwrap()).unwrap();
        assert_eq!(tax_percent_to_json(whole), json!(10));

        assert!(parse_tax_percent(&serde_json::from_str::<Number>("-1").unwrap()).is_err());
        assert!(parse_tax_percent(&serde_json::from_str::<Number>("100.5").unwrap()).is_err());
    }

    #[test]
    fn list_params_build_a_query() {
        let params = ListInvoicesParams {
            status: Some("overdue".to_string()),
            search: Some("  acme ".to_string()),
            sort: Some("total".to_string()),
            order: Some("asc".to_string()),
            ..ListInvoicesParams::default()
        };
        let query = params.into_query().unwrap();
        assert_eq!(query.status, Some(InvoiceStatus::Overdue));
        assert_eq!(query.search.as_deref(), Some("acme"));

        let bad = ListInvoicesParams {
            status: Some("archived".to_string()),
            ..ListInvoicesParams::default()
        };
        let response = bad.into_query().unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
