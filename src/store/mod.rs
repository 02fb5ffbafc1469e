//! # Object Store
//!
//! The single point through which the reconciler reads and mutates cluster
//! state. Every write touches exactly one object and updates are guarded by
//! the version the caller last observed.
//!
//! - [`KubeStore`]: Kubernetes API server via kube-rs
//! - [`MemoryStore`]: in-process store with fault injection

mod kubernetes;
mod memory;

pub use self::kubernetes::KubeStore;
pub use self::memory::{MemoryStore, StoreOp, WriteRecord};

use crate::controller::reconciler::subordinate::{OwnerRef, SubordinateKind, SubordinateObject};
use crate::crd::GiteaStatus;
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Store failures, classified by how the reconciler reacts to them
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    /// The object changed since it was read
    #[error("conflict: {0}")]
    Conflict(String),
    /// The store could not be reached or is overloaded
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The store refused the request; retrying the same write will not help
    #[error("rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Whether the next attempt can be expected to succeed without a spec change
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StoreError::Rejected(_))
    }
}

/// Typed access to subordinate objects and the declared resource's status
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one subordinate. `Ok(None)` when it does not exist.
    async fn get(
        &self,
        kind: SubordinateKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SubordinateObject>, StoreError>;

    /// Create a subordinate. Fails with [`StoreError::AlreadyExists`] if the name is taken.
    async fn create(&self, object: &SubordinateObject) -> Result<SubordinateObject, StoreError>;

    /// Write the controlled fields of a subordinate.
    /// Fails with [`StoreError::Conflict`] when `expected_version` is stale.
    async fn update(
        &self,
        object: &SubordinateObject,
        expected_version: &str,
    ) -> Result<SubordinateObject, StoreError>;

    /// Delete a subordinate. Deleting an absent object succeeds.
    async fn delete(
        &self,
        kind: SubordinateKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError>;

    /// All subordinates of `kind` in `namespace` owned by `owner`
    async fn list(
        &self,
        kind: SubordinateKind,
        namespace: &str,
        owner: &OwnerRef,
    ) -> Result<Vec<SubordinateObject>, StoreError>;

    /// Decoded data of a user-provided Secret. `Ok(None)` when it does not exist.
    async fn get_secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, StoreError>;

    /// Replace the status sub-document of a Gitea resource
    async fn write_status(
        &self,
        namespace: &str,
        name: &str,
        status: &GiteaStatus,
    ) -> Result<(), StoreError>;
}
