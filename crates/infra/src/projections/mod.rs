//! Projections: read models built from committed events.
//!
//! Every projection is rebuildable from the event store, partitioned by tenant and
//! idempotent under at-least-once delivery (per-stream cursors skip duplicates).

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use billdesk_core::{AggregateId, TenantId};

pub mod customers;
pub mod invoices;

pub use customers::{CustomerReadModel, CustomersProjection};
pub use invoices::{InvoiceReadModel, InvoicesProjection};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    /// An event arrived for a record whose creation was never projected.
    #[error("no read model record for stream {0}")]
    UnknownStream(AggregateId),
}

/// What to do with an incoming envelope, given the stream's cursor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum CursorDecision {
    Apply,
    Duplicate,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

/// Last applied sequence number per tenant stream.
#[derive(Debug, Default)]
pub(crate) struct StreamCursors {
    inner: RwLock<HashMap<CursorKey, u64>>,
}

impl StreamCursors {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn decide(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        sequence_number: u64,
    ) -> Result<CursorDecision, ProjectionError> {
        let last = self.last(tenant_id, aggregate_id);
        if sequence_number != 0 && sequence_number <= last {
            return Ok(CursorDecision::Duplicate);
        }
        if sequence_number != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: sequence_number,
            });
        }
        Ok(CursorDecision::Apply)
    }

    pub(crate) fn advance(&self, tenant_id: TenantId, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.insert(CursorKey { tenant_id, aggregate_id }, sequence_number);
        }
    }

    pub(crate) fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.retain(|k, _| k.tenant_id != tenant_id);
        }
    }

    fn last(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        match self.inner.read() {
            Ok(cursors) => cursors
                .get(&CursorKey { tenant_id, aggregate_id })
                .copied()
                .unwrap_or(0),
            Err(_) => 0,
        }
    }
}
