use axum::Router;

pub mod customers;
pub mod dashboard;
pub mod invoices;
pub mod system;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/customers", customers::router())
        .nest("/invoices", invoices::router())
        .nest("/dashboard", dashboard::router())
}
