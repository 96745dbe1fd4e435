//! Infrastructure wiring for the HTTP layer.

use std::sync::Arc;

use billdesk_infra::config::BillingConfig;
use billdesk_infra::delivery::{DeliveryGateway, DevDeliveryGateway};
use billdesk_infra::service::InvoicingService;

/// Everything handlers need, shared behind an `Arc`.
#[derive(Debug)]
pub struct AppServices {
    invoicing: InvoicingService,
    gateway: Arc<DevDeliveryGateway>,
    recent_invoices: usize,
}

impl AppServices {
    /// In-memory store and bus with the built-in dev delivery gateway.
    pub fn from_config(config: &BillingConfig) -> Self {
        let gateway = Arc::new(DevDeliveryGateway::new(
            config.document_base_url.clone(),
            config.checkout_base_url.clone(),
        ));
        let shared: Arc<dyn DeliveryGateway> = gateway.clone();
        Self {
            invoicing: InvoicingService::in_memory(shared, config),
            gateway,
            recent_invoices: 5,
        }
    }

    pub fn invoicing(&self) -> &InvoicingService {
        &self.invoicing
    }

    /// The dev gateway, for inspecting sent mail or injecting failures.
    pub fn gateway(&self) -> &Arc<DevDeliveryGateway> {
        &self.gateway
    }

    pub fn recent_invoices(&self) -> usize {
        self.recent_invoices
    }
}
