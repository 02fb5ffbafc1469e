//! # Reconcile
//!
//! One reconciliation attempt for one Gitea resource:
//!
//! 1. extract the desired state (invalid declarations stop here)
//! 2. resolve the mode and detect transitions
//! 3. look up the referenced credential (external mode)
//! 4. list owned subordinates and plan
//! 5. apply the plan
//! 6. probe the external endpoint once its mirror is synced
//! 7. report and persist status
//!
//! Each attempt starts from the resource and the store alone, so an attempt
//! interrupted at any point is repaired by the next one.

use super::apply::{self, ApplyResult};
use super::credential::CredentialState;
use super::desired::{DesiredState, ExtractError};
use super::mode::{self, ModeResolution};
use super::plan::{self, OrderedPlan};
use super::probe::ProbeOutcome;
use super::status::{self, AttemptOutcome, Report, RequeueDirective};
use super::subordinate::{SubordinateKind, SubordinateObject};
use super::types::{Reconciler, ReconcilerError};
use crate::crd::{Gitea, GiteaStatus, Mode};
use crate::observability::metrics;
use crate::store::{ObjectStore, StoreError};
use chrono::{DateTime, Utc};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// What one attempt did, for logging and tests
#[derive(Debug)]
pub struct AttemptReport {
    /// `None` when the declaration was invalid
    pub resolution: Option<ModeResolution>,
    pub plan: OrderedPlan,
    pub apply: ApplyResult,
    pub probe: Option<ProbeOutcome>,
    pub report: Report,
    /// False when the status already matched and nothing was written
    pub status_written: bool,
}

/// Owned subordinates of every kind
async fn observe(
    store: &dyn ObjectStore,
    desired: &DesiredState,
) -> Result<Vec<SubordinateObject>, StoreError> {
    let owner = desired.owner_ref();
    let mut observed = Vec::new();
    for kind in SubordinateKind::ALL {
        observed.extend(store.list(kind, &desired.namespace, &owner).await?);
    }
    Ok(observed)
}

/// The mirror's operations, if any, all went through
fn mirror_synced(result: &ApplyResult) -> bool {
    let is_mirror = |kind: SubordinateKind| kind == SubordinateKind::CredentialMirror;
    !result.failed.iter().any(|(op, _)| is_mirror(op.kind()))
        && !result.skipped.iter().any(|op| is_mirror(op.kind()))
}

/// Write `status` unless it is what the resource already carries
async fn persist(
    store: &dyn ObjectStore,
    namespace: &str,
    name: &str,
    previous: Option<&GiteaStatus>,
    status: &GiteaStatus,
) -> Result<bool, StoreError> {
    if previous == Some(status) {
        debug!("Status of {}/{} unchanged, skipping write", namespace, name);
        return Ok(false);
    }
    store.write_status(namespace, name, status).await?;
    Ok(true)
}

/// Run one complete attempt and persist its status.
///
/// Returns an error only when the attempt cannot be reported at all: the
/// resource has no name or namespace, the planner's contract was broken, or
/// the status write failed.
pub async fn reconcile_once(
    ctx: &Reconciler,
    gitea: &Gitea,
    now: DateTime<Utc>,
) -> Result<AttemptReport, ReconcilerError> {
    let name = gitea
        .metadata
        .name
        .as_deref()
        .ok_or(ExtractError::MissingMetadata("name"))?;
    let namespace = gitea
        .metadata
        .namespace
        .as_deref()
        .ok_or(ExtractError::MissingMetadata("namespace"))?;
    let previous = gitea.status.as_ref();
    let store = ctx.store.as_ref();

    let desired = match DesiredState::extract(gitea, &ctx.default_image) {
        Ok(desired) => desired,
        Err(err) => {
            warn!("⚠️  Gitea {}/{} has an invalid declaration: {}", namespace, name, err);
            let report = status::report_invalid(previous, &err, now);
            let status_written = persist(store, namespace, name, previous, &report.status).await?;
            return Ok(AttemptReport {
                resolution: None,
                plan: OrderedPlan::default(),
                apply: ApplyResult::default(),
                probe: None,
                report,
                status_written,
            });
        }
    };

    let resolution = mode::resolve(&desired, previous);
    if resolution.transitioned {
        if let Some(from) = resolution.previous {
            info!(
                "🔀 Gitea {}/{} switching from {} to {} mode",
                namespace, name, from, resolution.mode
            );
            metrics::increment_mode_transitions(from, resolution.mode);
        }
    }

    let credential = CredentialState::lookup(store, &desired).await;

    let (plan, observation_error) = match observe(store, &desired).await {
        Ok(observed) => {
            let plan = plan::plan(resolution.mode, &desired, credential.credential(), &observed)
                .inspect_err(|e| error!("❌ Planner contract violated for {}/{}: {}", namespace, name, e))?;
            (plan, None)
        }
        Err(err) => {
            warn!("Failed to observe subordinates of {}/{}: {}", namespace, name, err);
            (OrderedPlan::default(), Some(err))
        }
    };

    if plan.is_empty() {
        debug!("Subordinates of {}/{} already match", namespace, name);
    } else {
        info!(
            "🔄 Applying {} operation(s) for {}/{}",
            plan.len(),
            namespace,
            name
        );
    }
    let applied = apply::apply(store, plan.clone()).await;

    let probe = match credential.credential() {
        Some(credential)
            if resolution.mode == Mode::External
                && observation_error.is_none()
                && mirror_synced(&applied) =>
        {
            let outcome = ctx.prober.probe(credential).await;
            metrics::record_probe_outcome(outcome.as_str());
            Some(outcome)
        }
        _ => None,
    };

    let report = status::report(
        previous,
        &AttemptOutcome {
            desired: &desired,
            resolution,
            credential: &credential,
            observation_error: observation_error.as_ref(),
            apply: &applied,
            probe: probe.as_ref(),
        },
        &ctx.policy,
        now,
    );
    let status_written = persist(store, namespace, name, previous, &report.status).await?;

    Ok(AttemptReport {
        resolution: Some(resolution),
        plan,
        apply: applied,
        probe,
        report,
        status_written,
    })
}

/// Controller entry point: one deadline-bounded attempt
pub async fn reconcile(gitea: Arc<Gitea>, ctx: Arc<Reconciler>) -> Result<Action, ReconcilerError> {
    let name = gitea.metadata.name.clone().unwrap_or_default();
    let namespace = gitea.metadata.namespace.clone().unwrap_or_default();
    let span = tracing::info_span!(
        "reconcile",
        resource.name = %name,
        resource.namespace = %namespace,
        resource.generation = gitea.metadata.generation.unwrap_or_default(),
        mode = tracing::field::Empty,
    );

    async move {
        let start = Instant::now();
        metrics::increment_reconciliations();

        let attempt =
            tokio::time::timeout(ctx.attempt_timeout, reconcile_once(&ctx, &gitea, Utc::now()))
                .await
                .map_err(|_elapsed| ReconcilerError::DeadlineExceeded(ctx.attempt_timeout))?;
        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        let attempt = attempt?;

        if let Some(resolution) = attempt.resolution {
            tracing::Span::current().record("mode", resolution.mode.as_str());
        }
        let ready = attempt.report.status.is_true(crate::constants::CONDITION_READY);
        metrics::increment_requeues(attempt.report.reason.as_str());

        match attempt.report.requeue {
            RequeueDirective::None => {
                info!("⏸️  {}/{} waiting for a spec change (ready: {})", namespace, name, ready);
                Ok(Action::await_change())
            }
            RequeueDirective::After(delay) => {
                info!(
                    "✅ Reconciled {}/{} (ready: {}, next attempt in {}s, reason: {})",
                    namespace,
                    name,
                    ready,
                    delay.as_secs(),
                    attempt.report.reason.as_str()
                );
                Ok(Action::requeue(delay))
            }
        }
    }
    .instrument(span)
    .await
}
