//! # Plan Applier
//!
//! Executes an [`OrderedPlan`] against the store.
//!
//! - Chains run concurrently; operations inside a chain run in plan order.
//! - A failed operation skips the rest of its chain but not other chains.
//! - Every operation is safe to repeat: a create that finds the object already
//!   present is checked against the desired spec, a delete of a missing object
//!   succeeds.
//! - A stale update is recorded as failed and never retried with the same data;
//!   the next attempt re-reads and re-plans.

use super::plan::{Operation, OrderedPlan};
use super::subordinate::SubordinateObject;
use crate::observability::metrics;
use crate::store::{ObjectStore, StoreError};
use futures::future::join_all;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct ApplyResult {
    pub succeeded: Vec<Operation>,
    pub failed: Vec<(Operation, StoreError)>,
    /// Operations not attempted because an earlier one in their chain failed
    pub skipped: Vec<Operation>,
}

impl ApplyResult {
    /// Nothing failed and nothing was skipped
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    fn merge(&mut self, other: ApplyResult) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
        self.skipped.extend(other.skipped);
    }
}

pub async fn apply(store: &dyn ObjectStore, plan: OrderedPlan) -> ApplyResult {
    let chains = plan.into_chains();
    let results = join_all(
        chains
            .into_iter()
            .map(|(_, operations)| apply_chain(store, operations)),
    )
    .await;

    let mut result = ApplyResult::default();
    for chain_result in results {
        result.merge(chain_result);
    }
    result
}

async fn apply_chain(store: &dyn ObjectStore, operations: Vec<Operation>) -> ApplyResult {
    let mut result = ApplyResult::default();
    let mut operations = operations.into_iter();

    for operation in operations.by_ref() {
        match execute(store, &operation).await {
            Ok(()) => {
                debug!("✅ {}", operation);
                metrics::record_subordinate_operation(operation.kind(), operation.verb(), "success");
                result.succeeded.push(operation);
            }
            Err(err) => {
                warn!("❌ {} failed: {}", operation, err);
                metrics::record_subordinate_operation(operation.kind(), operation.verb(), "failure");
                result.failed.push((operation, err));
                break;
            }
        }
    }

    result.skipped.extend(operations);
    result
}

async fn execute(store: &dyn ObjectStore, operation: &Operation) -> Result<(), StoreError> {
    match operation {
        Operation::Create(object) => create_or_adopt(store, object).await,
        Operation::Update {
            object,
            expected_version,
        } => store.update(object, expected_version).await.map(|_| ()),
        Operation::Delete {
            kind,
            namespace,
            name,
        } => match store.delete(*kind, namespace, name).await {
            Ok(()) | Err(StoreError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        },
    }
}

/// Create, or reconcile with an object that appeared since the snapshot was taken
async fn create_or_adopt(
    store: &dyn ObjectStore,
    object: &SubordinateObject,
) -> Result<(), StoreError> {
    match store.create(object).await {
        Ok(_) => Ok(()),
        Err(StoreError::AlreadyExists(what)) => {
            let existing = store
                .get(object.kind(), &object.namespace, &object.name)
                .await?
                .ok_or_else(|| {
                    StoreError::Conflict(format!("{what} disappeared after create was refused"))
                })?;

            let owner = object.owner.as_ref();
            if !owner.is_some_and(|owner| existing.is_owned_by(owner)) {
                return Err(StoreError::Rejected(format!(
                    "{what} is not managed by this Gitea"
                )));
            }
            if existing.spec == object.spec {
                debug!("{} already present and up to date", what);
                return Ok(());
            }

            let version = existing.resource_version.ok_or_else(|| {
                StoreError::Conflict(format!("{what} has no resource version"))
            })?;
            store.update(object, &version).await.map(|_| ())
        }
        Err(err) => Err(err),
    }
}
