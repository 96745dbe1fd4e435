//! Customer directory read model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use billdesk_core::TenantId;
use billdesk_customers::{CustomerEvent, CustomerId};
use billdesk_events::EventEnvelope;

use super::{CursorDecision, ProjectionError, StreamCursors};
use crate::read_model::TenantStore;

pub const CUSTOMER_AGGREGATE_TYPE: &str = "customers.customer";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerReadModel {
    pub customer_id: CustomerId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Removed customers stay addressable so existing invoices can still show them.
    pub removed: bool,
}

impl CustomerReadModel {
    /// Case-insensitive substring match on name or email. An empty needle matches.
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        needle.is_empty()
            || self.name.to_lowercase().contains(&needle)
            || self.email.to_lowercase().contains(&needle)
    }
}

#[derive(Debug)]
pub struct CustomersProjection<S>
where
    S: TenantStore<CustomerId, CustomerReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> CustomersProjection<S>
where
    S: TenantStore<CustomerId, CustomerReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    /// Any projected customer, removed or not.
    pub fn get(&self, tenant_id: TenantId, customer_id: &CustomerId) -> Option<CustomerReadModel> {
        self.store.get(tenant_id, customer_id)
    }

    /// Active customers, newest first, optionally filtered by name or email.
    pub fn directory(&self, tenant_id: TenantId, search: Option<&str>) -> Vec<CustomerReadModel> {
        let mut customers: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|c| !c.removed)
            .filter(|c| search.is_none_or(|needle| c.matches(needle)))
            .collect();
        customers.sort_by(|a, b| {
            b.registered_at
                .cmp(&a.registered_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        customers
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != CUSTOMER_AGGREGATE_TYPE {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if self.cursors.decide(tenant_id, aggregate_id, seq)? == CursorDecision::Duplicate {
            return Ok(());
        }

        let ev: CustomerEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        if ev.tenant_id() != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if ev.customer_id().0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "event customer_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            CustomerEvent::CustomerRegistered(e) => {
                self.store.upsert(
                    tenant_id,
                    e.customer_id,
                    CustomerReadModel {
                        customer_id: e.customer_id,
                        name: e.name,
                        email: e.email,
                        phone: e.contact.phone,
                        address: e.contact.address,
                        registered_at: e.occurred_at,
                        updated_at: e.occurred_at,
                        removed: false,
                    },
                );
            }
            CustomerEvent::CustomerUpdated(e) => {
                let mut rm = self
                    .store
                    .get(tenant_id, &e.customer_id)
                    .ok_or(ProjectionError::UnknownStream(aggregate_id))?;
                rm.name = e.name;
                rm.email = e.email;
                rm.phone = e.contact.phone;
                rm.address = e.contact.address;
                rm.updated_at = e.occurred_at;
                self.store.upsert(tenant_id, e.customer_id, rm);
            }
            CustomerEvent::CustomerRemoved(e) => {
                let mut rm = self
                    .store
                    .get(tenant_id, &e.customer_id)
                    .ok_or(ProjectionError::UnknownStream(aggregate_id))?;
                rm.removed = true;
                rm.updated_at = e.occurred_at;
                self.store.upsert(tenant_id, e.customer_id, rm);
            }
        }

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }

    /// Replace a tenant's directory with the result of replaying `envelopes`.
    pub fn rebuild_tenant(
        &self,
        tenant_id: TenantId,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.store.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
        for env in envelopes.into_iter().filter(|e| e.tenant_id() == tenant_id) {
            self.apply_envelope(&env)?;
        }
        Ok(())
    }
}
