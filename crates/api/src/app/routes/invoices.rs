use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use chrono::Utc;

use billdesk_infra::query::InvoiceListing;
use billdesk_infra::service::{NewInvoice, ServiceResult};
use billdesk_invoicing::InvoiceStatus;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_invoice).get(list_invoices))
        .route("/defaults", get(invoice_defaults))
        .route(
            "/:id",
            get(get_invoice).patch(update_invoice).delete(delete_invoice),
        )
        .route("/:id/items", post(add_line_item))
        .route("/:id/items/:item_id", patch(update_line_item).delete(remove_line_item))
        .route("/:id/status", post(transition_invoice))
        .route("/:id/send", post(send_invoice))
        .route("/:id/delivery/retry", post(retry_delivery))
        .route("/:id/payment-link", post(request_payment_link))
        .route("/:id/pdf", post(attach_pdf))
}

fn invoice_response(status: StatusCode, result: ServiceResult<InvoiceListing>) -> axum::response::Response {
    match result {
        Ok(listing) => (status, Json(dto::invoice_to_json(listing))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreateInvoiceRequest>,
) -> axum::response::Response {
    let customer_id = match dto::parse_customer_id(&body.customer_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let due_date = match body.due_date() {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let tax_rate = match body.tax_rate() {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let input = NewInvoice {
        customer_id,
        due_date,
        tax_rate,
        notes: body.notes,
    };
    invoice_response(
        StatusCode::CREATED,
        services.invoicing().create_invoice(tenant.tenant_id(), input),
    )
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(params): Query<dto::ListInvoicesParams>,
) -> axum::response::Response {
    let query = match params.into_query() {
        Ok(q) => q,
        Err(resp) => return resp,
    };

    let items = services
        .invoicing()
        .invoices(tenant.tenant_id(), &query, Utc::now())
        .into_iter()
        .map(dto::invoice_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn invoice_defaults(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let defaults = services.invoicing().invoice_defaults(Utc::now().date_naive());
    (StatusCode::OK, Json(dto::defaults_to_json(defaults))).into_response()
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    invoice_response(StatusCode::OK, services.invoicing().invoice(tenant.tenant_id(), invoice_id))
}

pub async fn update_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateInvoiceRequest>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let patch = match body.into_patch() {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    invoice_response(
        StatusCode::OK,
        services.invoicing().update_details(tenant.tenant_id(), invoice_id, patch),
    )
}

pub async fn delete_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.invoicing().delete_invoice(tenant.tenant_id(), invoice_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn add_line_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddLineItemRequest>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services
        .invoicing()
        .add_line_item(tenant.tenant_id(), invoice_id, body.into())
    {
        Ok(change) => (StatusCode::CREATED, Json(dto::line_item_change_to_json(change))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_line_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path((id, item_id)): Path<(String, String)>,
    Json(body): Json<dto::UpdateLineItemRequest>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let line_item_id = match dto::parse_line_item_id(&item_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services
        .invoicing()
        .update_line_item(tenant.tenant_id(), invoice_id, line_item_id, body.into())
    {
        Ok(change) => (StatusCode::OK, Json(dto::line_item_change_to_json(change))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn remove_line_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path((id, item_id)): Path<(String, String)>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let line_item_id = match dto::parse_line_item_id(&item_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    invoice_response(
        StatusCode::OK,
        services
            .invoicing()
            .remove_line_item(tenant.tenant_id(), invoice_id, line_item_id),
    )
}

pub async fn transition_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::TransitionRequest>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let to: InvoiceStatus = match body.status.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    invoice_response(
        StatusCode::OK,
        services.invoicing().transition(tenant.tenant_id(), invoice_id, to),
    )
}

pub async fn send_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    invoice_response(StatusCode::OK, services.invoicing().send_invoice(tenant.tenant_id(), invoice_id))
}

pub async fn retry_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    invoice_response(StatusCode::OK, services.invoicing().retry_delivery(tenant.tenant_id(), invoice_id))
}

pub async fn request_payment_link(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    invoice_response(
        StatusCode::OK,
        services.invoicing().request_payment_link(tenant.tenant_id(), invoice_id),
    )
}

pub async fn attach_pdf(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    invoice_response(StatusCode::OK, services.invoicing().attach_pdf(tenant.tenant_id(), invoice_id))
}
