//! Line items and the per-invoice ledger that owns them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billdesk_core::{AggregateId, DomainError, DomainResult, Entity};

use crate::invoice::InvoiceId;

/// Upper bound for an invoice subtotal.
///
/// Keeps `subtotal + tax` (tax never exceeds the subtotal) within `u64`, and every
/// amount representable as a signed 64-bit integer for external stores.
pub const MAX_SUBTOTAL_CENTS: u64 = i64::MAX as u64;

/// Line item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineItemId(pub AggregateId);

impl LineItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LineItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One billed row of an invoice.
///
/// Fields are private: `total_cents == quantity * unit_price_cents` holds for every
/// value, including ones deserialized from stored events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LineItemRecord")]
pub struct LineItem {
    id: LineItemId,
    invoice_id: InvoiceId,
    description: String,
    quantity: u64,
    unit_price_cents: u64,
    total_cents: u64,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct LineItemRecord {
    id: LineItemId,
    invoice_id: InvoiceId,
    description: String,
    quantity: u64,
    unit_price_cents: u64,
    total_cents: u64,
    created_at: DateTime<Utc>,
}

impl TryFrom<LineItemRecord> for LineItem {
    type Error = DomainError;

    fn try_from(r: LineItemRecord) -> Result<Self, Self::Error> {
        let item = LineItem::build(
            r.id,
            r.invoice_id,
            &r.description,
            r.quantity,
            r.unit_price_cents,
            r.created_at,
        )?;
        if item.total_cents != r.total_cents {
            return Err(DomainError::invariant(format!(
                "line item {} total {} does not match quantity * unit price",
                r.id, r.total_cents
            )));
        }
        Ok(item)
    }
}

impl Entity for LineItem {
    type Id = LineItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl LineItem {
    /// Validate raw input and compute the extended total.
    pub fn new(
        id: LineItemId,
        invoice_id: InvoiceId,
        description: &str,
        quantity: i64,
        unit_price_cents: i64,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let quantity = validate_quantity(quantity)?;
        let unit_price_cents = validate_unit_price(unit_price_cents)?;
        Self::build(id, invoice_id, description, quantity, unit_price_cents, created_at)
    }

    fn build(
        id: LineItemId,
        invoice_id: InvoiceId,
        description: &str,
        quantity: u64,
        unit_price_cents: u64,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let description = validate_description(description)?;
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let total_cents = quantity
            .checked_mul(unit_price_cents)
            .filter(|total| *total <= MAX_SUBTOTAL_CENTS)
            .ok_or_else(|| DomainError::validation("line item total is too large"))?;

        Ok(Self {
            id,
            invoice_id,
            description,
            quantity,
            unit_price_cents,
            total_cents,
            created_at,
        })
    }

    /// A copy with `patch` applied and the total recomputed.
    pub fn patched(&self, patch: &LineItemPatch) -> DomainResult<Self> {
        let description = patch.description.as_deref().unwrap_or(&self.description);
        let quantity = match patch.quantity {
            Some(q) => validate_quantity(q)?,
            None => self.quantity,
        };
        let unit_price_cents = match patch.unit_price_cents {
            Some(p) => validate_unit_price(p)?,
            None => self.unit_price_cents,
        };
        Self::build(
            self.id,
            self.invoice_id,
            description,
            quantity,
            unit_price_cents,
            self.created_at,
        )
    }

    pub fn id_typed(&self) -> LineItemId {
        self.id
    }

    pub fn invoice_id(&self) -> InvoiceId {
        self.invoice_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn unit_price_cents(&self) -> u64 {
        self.unit_price_cents
    }

    pub fn total_cents(&self) -> u64 {
        self.total_cents
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Partial update for a line item. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemPatch {
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price_cents: Option<i64>,
}

/// The line items of one invoice, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemLedger {
    invoice_id: InvoiceId,
    items: Vec<LineItem>,
}

impl LineItemLedger {
    pub fn new(invoice_id: InvoiceId) -> Self {
        Self {
            invoice_id,
            items: Vec::new(),
        }
    }

    pub fn invoice_id(&self) -> InvoiceId {
        self.invoice_id
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, item_id: LineItemId) -> Option<&LineItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Sum of all item totals; 0 when empty.
    pub fn subtotal(&self) -> u64 {
        // Bounded by MAX_SUBTOTAL_CENTS on every insert and update.
        self.items.iter().map(|item| item.total_cents).sum()
    }

    pub fn add_item(
        &mut self,
        item_id: LineItemId,
        description: &str,
        quantity: i64,
        unit_price_cents: i64,
        created_at: DateTime<Utc>,
    ) -> DomainResult<LineItem> {
        if self.get(item_id).is_some() {
            return Err(DomainError::conflict(format!("line item {item_id} already exists")));
        }
        let item = LineItem::new(
            item_id,
            self.invoice_id,
            description,
            quantity,
            unit_price_cents,
            created_at,
        )?;
        self.ensure_subtotal_fits(self.subtotal(), item.total_cents)?;

        self.items.push(item.clone());
        Ok(item)
    }

    pub fn update_item(&mut self, item_id: LineItemId, patch: &LineItemPatch) -> DomainResult<LineItem> {
        let index = self.position(item_id)?;
        let updated = self.items[index].patched(patch)?;
        let others = self.subtotal() - self.items[index].total_cents;
        self.ensure_subtotal_fits(others, updated.total_cents)?;

        self.items[index] = updated.clone();
        Ok(updated)
    }

    pub fn remove_item(&mut self, item_id: LineItemId) -> DomainResult<LineItem> {
        let index = self.position(item_id)?;
        Ok(self.items.remove(index))
    }

    /// Remove every item (cascade step of invoice deletion).
    pub fn remove_all(&mut self) -> Vec<LineItem> {
        core::mem::take(&mut self.items)
    }

    /// Insert or replace an item that was already validated (event replay).
    pub(crate) fn restore(&mut self, item: LineItem) {
        match self.items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }

    fn position(&self, item_id: LineItemId) -> DomainResult<usize> {
        self.items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or_else(DomainError::not_found)
    }

    fn ensure_subtotal_fits(&self, base: u64, added: u64) -> DomainResult<()> {
        match base.checked_add(added) {
            Some(subtotal) if subtotal <= MAX_SUBTOTAL_CENTS => Ok(()),
            _ => Err(DomainError::invariant("invoice subtotal exceeds the supported maximum")),
        }
    }
}

fn validate_description(description: &str) -> DomainResult<String> {
    let description = description.trim();
    if description.is_empty() {
        return Err(DomainError::validation("description cannot be empty"));
    }
    Ok(description.to_string())
}

fn validate_quantity(quantity: i64) -> DomainResult<u64> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(quantity as u64)
}

fn validate_unit_price(unit_price_cents: i64) -> DomainResult<u64> {
    if unit_price_cents < 0 {
        return Err(DomainError::validation("unit price cannot be negative"));
    }
    Ok(unit_price_cents as u64)
}
