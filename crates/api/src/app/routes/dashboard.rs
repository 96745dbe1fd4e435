use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;

use crate::app::dto;
use crate::app::services::AppServices;
use crate::context::TenantContext;

const DEFAULT_REVENUE_MONTHS: u32 = 6;
const MAX_REVENUE_MONTHS: u32 = 120;

pub fn router() -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/revenue", get(revenue))
}

pub async fn dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(params): Query<dto::DashboardParams>,
) -> axum::response::Response {
    let recent = params.recent.unwrap_or_else(|| services.recent_invoices());
    let view = services.invoicing().dashboard(tenant.tenant_id(), Utc::now(), recent);
    (StatusCode::OK, Json(dto::dashboard_to_json(view))).into_response()
}

pub async fn revenue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(params): Query<dto::RevenueParams>,
) -> axum::response::Response {
    let months = params
        .months
        .unwrap_or(DEFAULT_REVENUE_MONTHS)
        .clamp(1, MAX_REVENUE_MONTHS);
    let series = services.invoicing().revenue(tenant.tenant_id(), Utc::now(), months);
    (StatusCode::OK, Json(dto::revenue_to_json(series))).into_response()
}
