use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use billdesk_core::TenantId;

use crate::context::TenantContext;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Resolves the tenant from the `x-tenant-id` header; requests without a valid one
/// are rejected with 401.
pub async fn tenant_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let tenant_id = extract_tenant(req.headers())?;
    req.extensions_mut().insert(TenantContext::new(tenant_id));
    Ok(next.run(req).await)
}

fn extract_tenant(headers: &HeaderMap) -> Result<TenantId, StatusCode> {
    let header = headers.get(TENANT_HEADER).ok_or(StatusCode::UNAUTHORIZED)?;
    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let value = header.trim();
    if value.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    value.parse().map_err(|_| StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn tenant_header_must_be_a_uuid() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_tenant(&headers), Err(StatusCode::UNAUTHORIZED));

        headers.insert(TENANT_HEADER, HeaderValue::from_static("acme"));
        assert_eq!(extract_tenant(&headers), Err(StatusCode::UNAUTHORIZED));

        let tenant_id = TenantId::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_str(&format!(" {tenant_id} ")).unwrap());
        assert_eq!(extract_tenant(&headers), Ok(tenant_id));
    }
}
