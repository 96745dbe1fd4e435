//! Infrastructure layer: event store, command dispatch, read models and the
//! application service that ties invoicing to its external collaborators.

pub mod command_dispatcher;
pub mod config;
pub mod dashboard;
pub mod delivery;
pub mod event_store;
pub mod projections;
pub mod query;
pub mod read_model;
pub mod service;
