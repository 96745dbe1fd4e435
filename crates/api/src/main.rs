use std::sync::Arc;

use anyhow::Context;

use billdesk_api::app::{build_app, services::AppServices};
use billdesk_infra::config::BillingConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BillingConfig::load().context("failed to load configuration")?;
    billdesk_observability::init_with(config.log_format);

    let services = Arc::new(AppServices::from_config(&config));
    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
