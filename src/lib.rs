//! Gitea Operator Library
//!
//! Reconciliation engine for the `Gitea` custom resource, usable without a
//! cluster through [`store::MemoryStore`].

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod store;
