use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use billdesk_events::Event;

/// Customer identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub AggregateId);

impl CustomerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Optional ways to reach a customer besides email.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl ContactDetails {
    fn normalized(&self) -> Self {
        Self {
            phone: normalize_optional(self.phone.as_deref()),
            address: normalize_optional(self.address.as_deref()),
        }
    }
}

/// Aggregate root: Customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    id: CustomerId,
    tenant_id: Option<TenantId>,
    name: String,
    email: String,
    contact: ContactDetails,
    registered_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
    removed: bool,
}

impl Customer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CustomerId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            email: String::new(),
            contact: ContactDetails::default(),
            registered_at: None,
            version: 0,
            created: false,
            removed: false,
        }
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn contact(&self) -> &ContactDetails {
        &self.contact
    }

    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    /// Whether invoices may be billed to this customer.
    pub fn is_active(&self) -> bool {
        self.created && !self.removed
    }
}

impl AggregateRoot for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterCustomer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCustomer {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub name: String,
    pub email: String,
    pub contact: Option<ContactDetails>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateCustomer.
///
/// Fields left as `None` keep their value. An empty phone or address clears it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCustomer {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveCustomer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveCustomer {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerCommand {
    RegisterCustomer(RegisterCustomer),
    UpdateCustomer(UpdateCustomer),
    RemoveCustomer(RemoveCustomer),
}

/// Event: CustomerRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRegistered {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub name: String,
    pub email: String,
    pub contact: ContactDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CustomerUpdated (full snapshot of the editable fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerUpdated {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub name: String,
    pub email: String,
    pub contact: ContactDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CustomerRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRemoved {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerEvent {
    CustomerRegistered(CustomerRegistered),
    CustomerUpdated(CustomerUpdated),
    CustomerRemoved(CustomerRemoved),
}

impl CustomerEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            CustomerEvent::CustomerRegistered(e) => e.tenant_id,
            CustomerEvent::CustomerUpdated(e) => e.tenant_id,
            CustomerEvent::CustomerRemoved(e) => e.tenant_id,
        }
    }

    pub fn customer_id(&self) -> CustomerId {
        match self {
            CustomerEvent::CustomerRegistered(e) => e.customer_id,
            CustomerEvent::CustomerUpdated(e) => e.customer_id,
            CustomerEvent::CustomerRemoved(e) => e.customer_id,
        }
    }
}

impl Event for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::CustomerRegistered(_) => "customers.customer.registered",
            CustomerEvent::CustomerUpdated(_) => "customers.customer.updated",
            CustomerEvent::CustomerRemoved(_) => "customers.customer.removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CustomerEvent::CustomerRegistered(e) => e.occurred_at,
            CustomerEvent::CustomerUpdated(e) => e.occurred_at,
            CustomerEvent::CustomerRemoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Customer {
    type Command = CustomerCommand;
    type Event = CustomerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CustomerEvent::CustomerRegistered(e) => {
                self.id = e.customer_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.email = e.email.clone();
                self.contact = e.contact.clone();
                self.registered_at = Some(e.occurred_at);
                self.created = true;
            }
            CustomerEvent::CustomerUpdated(e) => {
                self.name = e.name.clone();
                self.email = e.email.clone();
                self.contact = e.contact.clone();
            }
            CustomerEvent::CustomerRemoved(_) => {
                self.removed = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CustomerCommand::RegisterCustomer(cmd) => self.handle_register(cmd),
            CustomerCommand::UpdateCustomer(cmd) => self.handle_update(cmd),
            CustomerCommand::RemoveCustomer(cmd) => self.handle_remove(cmd),
        }
    }
}

impl Customer {
    fn ensure_live(&self, tenant_id: TenantId, customer_id: CustomerId) -> Result<(), DomainError> {
        if !self.created || self.removed {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != customer_id {
            return Err(DomainError::invariant("customer_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("customer already exists"));
        }

        let name = validate_name(&cmd.name)?;
        let email = validate_email(&cmd.email)?;
        let contact = cmd.contact.clone().unwrap_or_default().normalized();

        Ok(vec![CustomerEvent::CustomerRegistered(CustomerRegistered {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            name,
            email,
            contact,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.customer_id)?;

        let name = match &cmd.name {
            Some(name) => validate_name(name)?,
            None => self.name.clone(),
        };
        let email = match &cmd.email {
            Some(email) => validate_email(email)?,
            None => self.email.clone(),
        };
        let contact = ContactDetails {
            phone: match &cmd.phone {
                Some(phone) => normalize_optional(Some(phone)),
                None => self.contact.phone.clone(),
            },
            address: match &cmd.address {
                Some(address) => normalize_optional(Some(address)),
                None => self.contact.address.clone(),
            },
        };

        if name == self.name && email == self.email && contact == self.contact {
            return Ok(vec![]);
        }

        Ok(vec![CustomerEvent::CustomerUpdated(CustomerUpdated {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            name,
            email,
            contact,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.customer_id)?;

        Ok(vec![CustomerEvent::CustomerRemoved(CustomerRemoved {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn validate_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    Ok(name.to_string())
}

fn validate_email(email: &str) -> Result<String, DomainError> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(DomainError::validation(format!("invalid email address: '{email}'")));
    }
    Ok(email.to_string())
}

fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
