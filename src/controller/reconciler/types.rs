//! # Types
//!
//! Context and error types shared by the reconciler and the runtime.

use super::desired::ExtractError;
use super::plan::PlanError;
use super::probe::ConnectivityProber;
use super::status::RequeuePolicy;
use crate::store::{ObjectStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that end an attempt without a regular report.
///
/// Everything an operator can fix is reported through status conditions
/// instead; these only reach the runtime's error policy.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Declaration cannot be addressed at all (no name or namespace)
    #[error("Invalid declaration: {0}")]
    InvalidDeclaration(#[from] ExtractError),
    /// The status could not be persisted
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    /// The planner was handed input it cannot have been given by a correct caller
    #[error("Contract violation: {0}")]
    ContractViolation(#[from] PlanError),
    #[error("Reconciliation attempt exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),
}

/// Reconciler context shared by every attempt.
///
/// Holds collaborators and configuration only; no state carries over from
/// one attempt to the next.
#[derive(Clone)]
pub struct Reconciler {
    pub store: Arc<dyn ObjectStore>,
    pub prober: Arc<dyn ConnectivityProber>,
    pub policy: RequeuePolicy,
    /// Image for internal instances that leave `spec.image` unset
    pub default_image: String,
    /// Deadline of one attempt
    pub attempt_timeout: Duration,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("policy", &self.policy)
            .field("default_image", &self.default_image)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        prober: Arc<dyn ConnectivityProber>,
        policy: RequeuePolicy,
        default_image: impl Into<String>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            store,
            prober,
            policy,
            default_image: default_image.into(),
            attempt_timeout,
        }
    }
}
