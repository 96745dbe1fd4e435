use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_customer).get(list_customers))
        .route(
            "/:id",
            get(get_customer).patch(update_customer).delete(remove_customer),
        )
}

pub async fn register_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::RegisterCustomerRequest>,
) -> axum::response::Response {
    match services.invoicing().register_customer(tenant.tenant_id(), body.into()) {
        Ok(customer) => (StatusCode::CREATED, Json(dto::customer_to_json(customer))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_customers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(params): Query<dto::SearchParams>,
) -> axum::response::Response {
    let items = services
        .invoicing()
        .customers(tenant.tenant_id(), params.search.as_deref())
        .into_iter()
        .map(dto::customer_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let customer_id = match dto::parse_customer_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.invoicing().customer(tenant.tenant_id(), customer_id) {
        Ok(customer) => (StatusCode::OK, Json(dto::customer_to_json(customer))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateCustomerRequest>,
) -> axum::response::Response {
    let customer_id = match dto::parse_customer_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .invoicing()
        .update_customer(tenant.tenant_id(), customer_id, body.into())
    {
        Ok(customer) => (StatusCode::OK, Json(dto::customer_to_json(customer))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn remove_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let customer_id = match dto::parse_customer_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.invoicing().remove_customer(tenant.tenant_id(), customer_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
