//! Ferry Broker - Rendezvous session registry and HTTP service
//!
//! The broker issues short session identifiers, pairs one receiver with
//! each sender, and then drops out of the data path: file bytes never
//! touch it.

pub mod registry;
pub mod service;

pub use registry::SessionRegistry;
