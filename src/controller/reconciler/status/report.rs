//! # Status Reporter
//!
//! Turns the outcome of one attempt into the next status document and a
//! requeue directive. Pure: the caller persists the result.
//!
//! ## Conditions
//!
//! - `Ready`: every other condition is satisfied
//! - `CredentialResolved`: referenced Secret read and accepted by the endpoint
//! - `SubordinatesSynced`: every planned operation succeeded
//! - `EndpointReachable`: external mode only, last probe outcome
//! - `Degraded`: retry budget exhausted or declaration invalid
//!
//! ## Requeue
//!
//! | Outcome                          | failureCount | Requeue             |
//! |----------------------------------|--------------|---------------------|
//! | converged                        | 0            | steady state        |
//! | retryable failure within budget  | +1           | backoff(count)      |
//! | retryable failure over budget    | +1           | steady state        |
//! | credential invalid / unauthorized| 0            | steady state        |
//! | invalid declaration              | unchanged    | none (spec edit)    |
//!
//! An attempt whose conclusions match the previous status returns that status
//! unchanged, `lastReconcileTime` included, so a no-op attempt has nothing to
//! write.

use super::conditions::{ConditionSet, STATUS_FALSE, STATUS_TRUE, STATUS_UNKNOWN};
use super::requeue::{RequeueDirective, RequeuePolicy, RequeueReason};
use crate::constants::{
    CONDITION_CREDENTIAL_RESOLVED, CONDITION_DEGRADED, CONDITION_ENDPOINT_REACHABLE,
    CONDITION_READY, CONDITION_SUBORDINATES_SYNCED,
};
use crate::controller::reconciler::apply::ApplyResult;
use crate::controller::reconciler::credential::CredentialState;
use crate::controller::reconciler::desired::{DesiredState, ExtractError};
use crate::controller::reconciler::mode::ModeResolution;
use crate::controller::reconciler::probe::ProbeOutcome;
use crate::crd::{GiteaStatus, Mode};
use crate::store::StoreError;
use chrono::{DateTime, SecondsFormat, Utc};

/// Everything one attempt observed and did
#[derive(Debug)]
pub struct AttemptOutcome<'a> {
    pub desired: &'a DesiredState,
    pub resolution: ModeResolution,
    pub credential: &'a CredentialState,
    /// Listing the observed subordinates failed; nothing was planned
    pub observation_error: Option<&'a StoreError>,
    pub apply: &'a ApplyResult,
    /// `None` when the probe did not run
    pub probe: Option<&'a ProbeOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub status: GiteaStatus,
    pub requeue: RequeueDirective,
    pub reason: RequeueReason,
}

/// How an attempt failed, if it did
#[derive(Debug, Default)]
struct Failures {
    retryable: bool,
    needs_user: bool,
}

impl Failures {
    fn record(&mut self, retryable: bool) {
        if retryable {
            self.retryable = true;
        } else {
            self.needs_user = true;
        }
    }
}

struct Verdict {
    status: &'static str,
    reason: &'static str,
    message: String,
}

impl Verdict {
    fn new(status: &'static str, reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            reason,
            message: message.into(),
        }
    }

    fn is_true(&self) -> bool {
        self.status == STATUS_TRUE
    }
}

/// `previous` when `next` differs from it only in `lastReconcileTime`
fn settle(previous: Option<&GiteaStatus>, next: GiteaStatus) -> GiteaStatus {
    match previous {
        Some(previous)
            if GiteaStatus {
                last_reconcile_time: previous.last_reconcile_time.clone(),
                ..next.clone()
            } == *previous =>
        {
            previous.clone()
        }
        _ => next,
    }
}

#[must_use]
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn credential_verdict(outcome: &AttemptOutcome<'_>, failures: &mut Failures) -> Verdict {
    if outcome.resolution.mode == Mode::Internal {
        return Verdict::new(
            STATUS_TRUE,
            "NotRequired",
            "internal instances do not use a credential",
        );
    }
    match outcome.credential {
        CredentialState::Resolved(_) => match outcome.probe {
            Some(ProbeOutcome::Unauthorized(message)) => {
                failures.record(false);
                Verdict::new(
                    STATUS_FALSE,
                    "Unauthorized",
                    format!("Gitea rejected the credential: {message}"),
                )
            }
            _ => Verdict::new(STATUS_TRUE, "Resolved", "credential read from the referenced Secret"),
        },
        CredentialState::NotFound { secret } => {
            failures.record(true);
            Verdict::new(
                STATUS_FALSE,
                "CredentialNotFound",
                format!("Secret {secret} not found"),
            )
        }
        CredentialState::Invalid { secret, error } => {
            failures.record(false);
            Verdict::new(
                STATUS_FALSE,
                "CredentialInvalid",
                format!("Secret {secret}: {error}"),
            )
        }
        CredentialState::LookupFailed { secret, error } => {
            failures.record(error.is_retryable());
            Verdict::new(
                STATUS_FALSE,
                "CredentialLookupFailed",
                format!("reading Secret {secret} failed: {error}"),
            )
        }
        CredentialState::NotRequired => Verdict::new(
            STATUS_UNKNOWN,
            "NotResolved",
            "credential has not been looked up",
        ),
    }
}

fn subordinates_verdict(outcome: &AttemptOutcome<'_>, failures: &mut Failures) -> Verdict {
    if let Some(error) = outcome.observation_error {
        failures.record(error.is_retryable());
        return Verdict::new(
            STATUS_FALSE,
            "ObservationFailed",
            format!("listing subordinates failed: {error}"),
        );
    }

    let apply = outcome.apply;
    if !apply.failed.is_empty() {
        for (_, error) in &apply.failed {
            failures.record(error.is_retryable());
        }
        let mut message = apply
            .failed
            .iter()
            .map(|(operation, error)| format!("{operation}: {error}"))
            .collect::<Vec<_>>()
            .join("; ");
        if !apply.skipped.is_empty() {
            message.push_str(&format!(" ({} dependent operation(s) skipped)", apply.skipped.len()));
        }
        return Verdict::new(STATUS_FALSE, "OperationFailed", message);
    }

    if outcome.resolution.mode == Mode::External && outcome.credential.credential().is_none() {
        return Verdict::new(
            STATUS_FALSE,
            "CredentialUnavailable",
            "credential mirror cannot be written until the credential resolves",
        );
    }

    Verdict::new(
        STATUS_TRUE,
        "Synced",
        "subordinates match the declaration",
    )
}

fn endpoint_verdict(probe: Option<&ProbeOutcome>, failures: &mut Failures) -> Verdict {
    let Some(outcome) = probe else {
        return Verdict::new(
            STATUS_UNKNOWN,
            "NotProbed",
            "probe runs once the credential mirror is synced",
        );
    };
    // Unauthorized is counted on CredentialResolved
    if outcome.is_retryable() {
        failures.record(true);
    }
    match outcome {
        ProbeOutcome::Reachable { version } => {
            Verdict::new(STATUS_TRUE, "Reachable", format!("Gitea {version}"))
        }
        ProbeOutcome::Unauthorized(message) => {
            Verdict::new(STATUS_TRUE, "Responded", message.clone())
        }
        ProbeOutcome::Unreachable(message) => {
            Verdict::new(STATUS_FALSE, "Unreachable", message.clone())
        }
        ProbeOutcome::Unexpected(message) => {
            Verdict::new(STATUS_FALSE, "ProbeFailed", message.clone())
        }
    }
}

/// Status and requeue directive for a completed attempt
#[must_use]
pub fn report(
    previous: Option<&GiteaStatus>,
    outcome: &AttemptOutcome<'_>,
    policy: &RequeuePolicy,
    now: DateTime<Utc>,
) -> Report {
    let now = timestamp(now);
    let desired = outcome.desired;
    let mode = outcome.resolution.mode;
    let mut failures = Failures::default();

    let credential = credential_verdict(outcome, &mut failures);
    let synced = subordinates_verdict(outcome, &mut failures);
    let endpoint = (mode == Mode::External).then(|| endpoint_verdict(outcome.probe, &mut failures));

    let reachable =
        mode == Mode::Internal || matches!(outcome.probe, Some(ProbeOutcome::Reachable { .. }));
    let ready = credential.is_true() && synced.is_true() && reachable;

    // A new generation starts a fresh retry budget
    let prior_failures = previous
        .filter(|p| p.observed_generation == Some(desired.generation))
        .map_or(0, |p| p.failure_count);

    let (failure_count, requeue, reason, degraded) = if failures.retryable {
        let count = prior_failures.saturating_add(1);
        if count > policy.retry_budget {
            (
                count,
                RequeueDirective::After(policy.steady_state),
                RequeueReason::Degraded,
                Verdict::new(
                    STATUS_TRUE,
                    "RetryBudgetExhausted",
                    format!("{count} consecutive attempts failed"),
                ),
            )
        } else {
            (
                count,
                RequeueDirective::After(policy.backoff.delay_for(count)),
                RequeueReason::Backoff,
                Verdict::new(
                    STATUS_FALSE,
                    "Retrying",
                    format!("attempt {count} of {} failed", policy.retry_budget),
                ),
            )
        }
    } else if failures.needs_user {
        (
            0,
            RequeueDirective::After(policy.steady_state),
            RequeueReason::AwaitingUser,
            Verdict::new(STATUS_FALSE, "AwaitingUserAction", "waiting for a credential fix"),
        )
    } else {
        (
            0,
            RequeueDirective::After(policy.steady_state),
            RequeueReason::Converged,
            Verdict::new(STATUS_FALSE, "AsExpected", "no failures"),
        )
    };

    let ready_verdict = if ready {
        Verdict::new(STATUS_TRUE, "Ready", format!("{mode} Gitea is ready"))
    } else {
        let blocking = [Some(&credential), Some(&synced), endpoint.as_ref()]
            .into_iter()
            .flatten()
            .find(|v| !v.is_true())
            .map_or_else(|| "not ready".to_string(), |v| v.message.clone());
        Verdict::new(STATUS_FALSE, "NotReady", blocking)
    };

    let previous_conditions = previous.map_or(&[][..], |p| p.conditions.as_slice());
    let mut conditions = ConditionSet::new(previous_conditions, &now);
    for (type_, verdict) in [
        (CONDITION_READY, Some(&ready_verdict)),
        (CONDITION_CREDENTIAL_RESOLVED, Some(&credential)),
        (CONDITION_SUBORDINATES_SYNCED, Some(&synced)),
        (CONDITION_ENDPOINT_REACHABLE, endpoint.as_ref()),
        (CONDITION_DEGRADED, Some(&degraded)),
    ] {
        if let Some(verdict) = verdict {
            conditions.set(type_, verdict.status, verdict.reason, verdict.message.clone());
        }
    }

    let previous_generation = previous.and_then(|p| p.observed_generation);
    let status = settle(previous, GiteaStatus {
        resolved_mode: if synced.is_true() {
            Some(mode)
        } else {
            previous.and_then(|p| p.resolved_mode)
        },
        observed_generation: Some(
            previous_generation.map_or(desired.generation, |g| g.max(desired.generation)),
        ),
        conditions: conditions.finish(),
        failure_count,
        last_reconcile_time: Some(now.clone()),
    });

    Report {
        status,
        requeue,
        reason,
    }
}

/// Status for a declaration that could not be turned into a desired state.
///
/// The generation, mode and failure count stay as they were; the attempt
/// never started. No requeue: only a spec edit helps.
#[must_use]
pub fn report_invalid(
    previous: Option<&GiteaStatus>,
    error: &ExtractError,
    now: DateTime<Utc>,
) -> Report {
    let now = timestamp(now);
    let previous_conditions = previous.map_or(&[][..], |p| p.conditions.as_slice());
    let message = format!("invalid declaration: {error}");

    let mut conditions = ConditionSet::new(previous_conditions, &now);
    conditions.set(CONDITION_READY, STATUS_FALSE, "InvalidDeclaration", message.clone());
    for type_ in [
        CONDITION_CREDENTIAL_RESOLVED,
        CONDITION_SUBORDINATES_SYNCED,
        CONDITION_ENDPOINT_REACHABLE,
    ] {
        conditions.keep(type_);
    }
    conditions.set(CONDITION_DEGRADED, STATUS_TRUE, "InvalidDeclaration", message);

    let status = GiteaStatus {
        conditions: conditions.finish(),
        last_reconcile_time: Some(now),
        ..previous.cloned().unwrap_or_default()
    };
    Report {
        status: settle(previous, status),
        requeue: RequeueDirective::None,
        reason: RequeueReason::InvalidDeclaration,
    }
}
