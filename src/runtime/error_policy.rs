//! # Error Policy
//!
//! Error handling and backoff for the controller watch loop.
//!
//! Backoff is derived from the persisted `status.failureCount`, so no
//! per-resource state is kept in memory.

use crate::controller::reconciler::{Reconciler, ReconcilerError, RequeueReason};
use crate::crd::Gitea;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Decide when to retry a resource whose attempt returned an error
pub fn handle_reconciliation_error(
    obj: Arc<Gitea>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("unknown");

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name,
        resource.namespace = namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("❌ Reconciliation error for {}/{}: {}", namespace, name, error);
    observability::metrics::increment_reconciliation_errors();

    if let ReconcilerError::InvalidDeclaration(_) = error {
        warn!("{}/{} cannot be addressed, waiting for a change", namespace, name);
        observability::metrics::increment_requeues(RequeueReason::InvalidDeclaration.as_str());
        return Action::await_change();
    }

    let failures = obj.status.as_ref().map_or(0, |status| status.failure_count);
    let delay = retry_delay(&ctx, failures);

    info!(
        "🔄 Retrying {}/{} in {}s (consecutive failures: {})",
        namespace,
        name,
        delay.as_secs(),
        failures
    );
    observability::metrics::increment_requeues(RequeueReason::Backoff.as_str());
    Action::requeue(delay)
}

/// Backoff after an attempt that failed without writing its own status
fn retry_delay(ctx: &Reconciler, persisted_failures: u32) -> Duration {
    ctx.policy
        .backoff
        .delay_for(persisted_failures.saturating_add(1))
}

/// Classify a watch stream error and wait before the stream restarts.
///
/// Returns `Some(())` to keep the event, `None` to drop it.
pub async fn handle_watch_stream_error(error_string: &str, restart_delay: Duration) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    let is_401 =
        (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found;
    let is_410 = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Gone");

    if is_401 {
        error!("❌ Watch authentication failed (401 Unauthorized) - check the operator's RBAC");
        warn!(
            "⏳ Waiting {}s before retrying watch...",
            restart_delay.as_secs()
        );
        tokio::time::sleep(restart_delay).await;
        None
    } else if is_410 {
        warn!("Watch resource version expired (410), watch will restart");
        None
    } else if is_not_found {
        warn!(
            "Resource not found (404) - the Gitea CRD may be missing or a resource was deleted. Error: {}",
            error_string
        );
        Some(())
    } else {
        error!("Controller stream error: {}", error_string);
        tokio::time::sleep(restart_delay).await;
        None
    }
}
