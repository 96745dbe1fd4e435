//! Customers domain module (event-sourced).
//!
//! The client records invoices are billed to, implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage).

pub mod customer;

pub use customer::{
    ContactDetails, Customer, CustomerCommand, CustomerEvent, CustomerId, CustomerRegistered,
    CustomerRemoved, CustomerUpdated, RegisterCustomer, RemoveCustomer, UpdateCustomer,
};
