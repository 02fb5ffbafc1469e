//! # Reconcile Tests
//!
//! Full reconciliation attempts against the in-memory store: convergence,
//! idempotence, mode transitions, failure handling and status reporting.

mod common;

use chrono::Utc;
use common::{
    gitea, operations, switch_to_external, switch_to_internal, Harness, ScriptedProber,
    StallingStore, EXTERNAL_SECRET, EXTERNAL_URL, NAMESPACE,
};
use gitea_operator::constants::{
    CONDITION_CREDENTIAL_RESOLVED, CONDITION_DEGRADED, CONDITION_ENDPOINT_REACHABLE,
    CONDITION_READY, CONDITION_SUBORDINATES_SYNCED,
};
use gitea_operator::controller::reconciler::apply;
use gitea_operator::controller::reconciler::desired::DesiredState;
use gitea_operator::controller::reconciler::plan;
use gitea_operator::controller::reconciler::probe::ProbeOutcome;
use gitea_operator::controller::reconciler::subordinate::{
    SubordinateKind, SubordinateObject, SubordinateSpec, WorkloadSpec,
};
use gitea_operator::controller::reconciler::{
    reconcile, reconcile_once, Reconciler, ReconcilerError, RequeueDirective, RequeueReason,
};
use gitea_operator::crd::{Gitea, GiteaSpec, Mode, SecretRef, SizePreset, Sizing};
use gitea_operator::store::{MemoryStore, ObjectStore, StoreError, StoreOp};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;

const STEADY: RequeueDirective = RequeueDirective::After(Duration::from_secs(600));

fn small() -> GiteaSpec {
    GiteaSpec {
        sizing: Some(Sizing {
            preset: SizePreset::Small,
            ..Sizing::default()
        }),
        ..GiteaSpec::default()
    }
}

fn reason(gitea: &Gitea, condition: &str) -> Option<String> {
    gitea
        .status
        .as_ref()
        .and_then(|s| s.condition(condition))
        .and_then(|c| c.reason.clone())
}

fn is_true(gitea: &Gitea, condition: &str) -> bool {
    gitea.status.as_ref().is_some_and(|s| s.is_true(condition))
}

fn workload(harness: &Harness) -> Option<WorkloadSpec> {
    harness
        .store
        .object(SubordinateKind::Workload, NAMESPACE, "docs")
        .and_then(|o| match o.spec {
            SubordinateSpec::Workload(spec) => Some(spec),
            _ => None,
        })
}

fn position(writes: &[String], entry: &str) -> usize {
    writes
        .iter()
        .position(|w| w == entry)
        .unwrap_or_else(|| panic!("{entry} not written, writes: {writes:?}"))
}

fn write_log(harness: &Harness) -> Vec<String> {
    harness
        .store
        .writes()
        .iter()
        .map(|w| format!("{:?} {} {}", w.op, w.kind, w.name))
        .collect()
}

#[tokio::test]
async fn test_internal_first_reconcile_creates_workload_and_endpoint() {
    let harness = Harness::new();
    let mut docs = gitea("docs", small());

    let attempt = harness.run(&mut docs).await.unwrap();

    assert_eq!(
        operations(&attempt),
        vec!["create workload docs", "create network-endpoint docs"]
    );
    assert!(attempt.apply.is_clean());
    assert_eq!(attempt.report.requeue, STEADY);

    let status = docs.status.clone().unwrap();
    assert_eq!(status.resolved_mode, Some(Mode::Internal));
    assert_eq!(status.observed_generation, Some(1));
    assert_eq!(status.failure_count, 0);
    assert!(is_true(&docs, CONDITION_READY));
    assert!(status.condition(CONDITION_ENDPOINT_REACHABLE).is_none());

    let workload = workload(&harness).unwrap();
    assert_eq!(workload.image, "gitea/gitea:1.22");
    assert_eq!(workload.replicas, 1);
    assert_eq!(workload.cpu, "250m");
    assert_eq!(workload.memory, "512Mi");
    assert!(harness.prober.probed().is_empty());
}

#[tokio::test]
async fn test_second_attempt_is_a_no_op() {
    let harness = Harness::new();
    let mut docs = gitea("docs", small());
    harness.run(&mut docs).await.unwrap();
    let first_status = docs.status.clone();
    harness.store.clear_writes();

    let attempt = harness.run(&mut docs).await.unwrap();

    assert!(attempt.plan.is_empty());
    assert!(harness.store.writes().is_empty());
    assert_eq!(
        docs.status.as_ref().map(|s| &s.conditions),
        first_status.as_ref().map(|s| &s.conditions)
    );
}

#[tokio::test]
async fn test_converged_attempts_do_not_rewrite_status() {
    let harness = Harness::new();
    let mut docs = gitea("docs", small());
    let first = harness.run(&mut docs).await.unwrap();
    assert!(first.status_written);
    let first_status = docs.status.clone().unwrap();
    harness.store.clear_writes();

    // Each attempt runs a second later than the previous one
    for _ in 0..3 {
        let attempt = harness.run(&mut docs).await.unwrap();
        assert!(attempt.plan.is_empty());
        assert!(!attempt.status_written);
        assert_eq!(attempt.report.requeue, STEADY);
    }

    assert_eq!(harness.store.status_writes(), 0);
    assert_eq!(docs.status.as_ref(), Some(&first_status));
}

#[tokio::test]
async fn test_repeated_invalid_declaration_writes_status_once() {
    let harness = Harness::new();
    let mut docs = gitea(
        "docs",
        GiteaSpec {
            sizing: Some(Sizing {
                replicas: Some(-1),
                ..Sizing::default()
            }),
            ..GiteaSpec::default()
        },
    );

    let first = harness.run(&mut docs).await.unwrap();
    assert!(first.status_written);
    let first_status = docs.status.clone().unwrap();

    let second = harness.run(&mut docs).await.unwrap();
    assert!(!second.status_written);
    assert_eq!(second.report.requeue, RequeueDirective::None);
    assert_eq!(harness.store.status_writes(), 1);
    assert_eq!(docs.status.as_ref(), Some(&first_status));
}

#[tokio::test]
async fn test_deadline_keeps_applied_operations_for_the_next_attempt() {
    let store = Arc::new(MemoryStore::new());
    let reconciler = Arc::new(Reconciler::new(
        Arc::new(StallingStore {
            inner: store.clone(),
            stall: SubordinateKind::NetworkEndpoint,
        }),
        Arc::new(ScriptedProber::reachable()),
        common::policy(),
        "gitea/gitea:1.22",
        Duration::from_millis(200),
    ));
    let docs = gitea("docs", small());

    let err = reconcile(Arc::new(docs.clone()), reconciler)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcilerError::DeadlineExceeded(_)), "{err}");

    // The workload chain finished before the deadline and stays applied
    assert!(store
        .object(SubordinateKind::Workload, NAMESPACE, "docs")
        .is_some());
    assert!(store
        .object(SubordinateKind::NetworkEndpoint, NAMESPACE, "docs")
        .is_none());
    assert!(store.status(NAMESPACE, "docs").is_none());

    let healthy = Reconciler::new(
        store.clone(),
        Arc::new(ScriptedProber::reachable()),
        common::policy(),
        "gitea/gitea:1.22",
        Duration::from_secs(30),
    );
    let attempt = reconcile_once(&healthy, &docs, Utc::now()).await.unwrap();
    assert_eq!(operations(&attempt), vec!["create network-endpoint docs"]);
    assert!(attempt.apply.is_clean());
}

#[tokio::test]
async fn test_requeue_directive_becomes_controller_action() {
    let harness = Harness::new();
    let reconciler = Arc::new(harness.reconciler.clone());

    let action = reconcile(Arc::new(gitea("docs", small())), Arc::clone(&reconciler))
        .await
        .unwrap();
    assert_eq!(action, Action::requeue(Duration::from_secs(600)));

    let invalid = gitea(
        "broken",
        GiteaSpec {
            secret_ref: Some(SecretRef {
                name: String::new(),
            }),
            ..GiteaSpec::default()
        },
    );
    let action = reconcile(Arc::new(invalid), reconciler).await.unwrap();
    assert_eq!(action, Action::await_change());
}

#[tokio::test]
async fn test_switch_to_external_creates_mirror_before_removing_workload() {
    let harness = Harness::new();
    let mut docs = gitea("docs", small());
    harness.run(&mut docs).await.unwrap();
    harness.store.clear_writes();

    switch_to_external(&mut docs);
    let attempt = harness.run(&mut docs).await.unwrap();

    let resolution = attempt.resolution.unwrap();
    assert!(resolution.transitioned);
    assert_eq!(resolution.previous, Some(Mode::Internal));
    assert_eq!(
        operations(&attempt),
        vec![
            "create credential-mirror docs-credential",
            "delete workload docs",
            "delete network-endpoint docs",
        ]
    );
    assert_eq!(
        attempt.probe,
        Some(ProbeOutcome::Reachable {
            version: "1.22.3".to_string()
        })
    );

    let writes = write_log(&harness);
    assert!(
        position(&writes, "Create credential-mirror docs-credential")
            < position(&writes, "Delete workload docs")
    );

    let status = docs.status.clone().unwrap();
    assert_eq!(status.resolved_mode, Some(Mode::External));
    assert_eq!(status.observed_generation, Some(2));
    assert!(is_true(&docs, CONDITION_READY));
    assert!(is_true(&docs, CONDITION_ENDPOINT_REACHABLE));
    assert_eq!(harness.prober.probed(), vec![EXTERNAL_URL.to_string()]);

    let remaining: Vec<_> = harness
        .store
        .objects(NAMESPACE)
        .into_iter()
        .map(|o| o.name)
        .collect();
    assert_eq!(remaining, vec!["docs-credential"]);
}

#[tokio::test]
async fn test_switch_back_to_internal_removes_mirror_after_workload_exists() {
    let harness = Harness::new();
    let mut docs = gitea("docs", small());
    switch_to_external(&mut docs);
    harness.run(&mut docs).await.unwrap();
    harness.store.clear_writes();

    switch_to_internal(&mut docs);
    let attempt = harness.run(&mut docs).await.unwrap();

    assert_eq!(
        operations(&attempt),
        vec![
            "create workload docs",
            "delete credential-mirror docs-credential",
            "create network-endpoint docs",
        ]
    );
    let writes = write_log(&harness);
    assert!(
        position(&writes, "Create workload docs")
            < position(&writes, "Delete credential-mirror docs-credential")
    );
    assert_eq!(
        docs.status.as_ref().and_then(|s| s.resolved_mode),
        Some(Mode::Internal)
    );
    assert!(harness
        .store
        .object(SubordinateKind::CredentialMirror, NAMESPACE, "docs-credential")
        .is_none());
}

#[tokio::test]
async fn test_transient_failure_backs_off_then_converges() {
    let harness = Harness::new();
    harness.store.fail_next(
        Some(SubordinateKind::Workload),
        StoreOp::Create,
        StoreError::Unavailable("etcd leader election".into()),
    );
    let mut docs = gitea("docs", small());

    let attempt = harness.run(&mut docs).await.unwrap();
    assert_eq!(attempt.report.reason, RequeueReason::Backoff);
    assert_eq!(
        attempt.report.requeue,
        RequeueDirective::After(Duration::from_secs(5))
    );
    let status = docs.status.clone().unwrap();
    assert_eq!(status.failure_count, 1);
    assert_eq!(status.resolved_mode, None);
    assert!(!is_true(&docs, CONDITION_READY));
    assert_eq!(
        reason(&docs, CONDITION_SUBORDINATES_SYNCED).as_deref(),
        Some("OperationFailed")
    );
    // The endpoint chain does not depend on the workload
    assert!(harness
        .store
        .object(SubordinateKind::NetworkEndpoint, NAMESPACE, "docs")
        .is_some());

    let attempt = harness.run(&mut docs).await.unwrap();
    assert_eq!(operations(&attempt), vec!["create workload docs"]);
    assert_eq!(attempt.report.requeue, STEADY);
    assert_eq!(docs.status.as_ref().map(|s| s.failure_count), Some(0));
    assert!(is_true(&docs, CONDITION_READY));
}

#[tokio::test]
async fn test_retry_budget_exhaustion_raises_degraded() {
    let harness = Harness::new();
    harness.store.fail_always(
        Some(SubordinateKind::Workload),
        StoreOp::Create,
        StoreError::Unavailable("quota admission webhook timed out".into()),
    );
    let mut docs = gitea("docs", small());

    let mut delays = Vec::new();
    for _ in 0..3 {
        let attempt = harness.run(&mut docs).await.unwrap();
        delays.push(attempt.report.requeue);
    }
    assert_eq!(
        delays,
        vec![
            RequeueDirective::After(Duration::from_secs(5)),
            RequeueDirective::After(Duration::from_secs(10)),
            RequeueDirective::After(Duration::from_secs(20)),
        ]
    );
    assert!(!is_true(&docs, CONDITION_DEGRADED));

    let attempt = harness.run(&mut docs).await.unwrap();
    assert_eq!(attempt.report.reason, RequeueReason::Degraded);
    assert_eq!(attempt.report.requeue, STEADY);
    assert!(is_true(&docs, CONDITION_DEGRADED));
    assert_eq!(
        reason(&docs, CONDITION_DEGRADED).as_deref(),
        Some("RetryBudgetExhausted")
    );

    harness.store.clear_faults();
    harness.run(&mut docs).await.unwrap();
    assert!(!is_true(&docs, CONDITION_DEGRADED));
    assert!(is_true(&docs, CONDITION_READY));
}

#[tokio::test]
async fn test_concurrent_edit_is_not_overwritten() {
    let harness = Harness::new();
    let mut docs = gitea("docs", small());
    harness.run(&mut docs).await.unwrap();

    let set_replicas = |replicas: i32| {
        move |spec: &mut SubordinateSpec| {
            if let SubordinateSpec::Workload(workload) = spec {
                workload.replicas = replicas;
            }
        }
    };
    assert!(harness
        .store
        .edit(SubordinateKind::Workload, NAMESPACE, "docs", set_replicas(3)));

    // Plan against what is observed now, then let another writer win the race
    let desired = DesiredState::extract(&docs, "gitea/gitea:1.22").unwrap();
    let owner = desired.owner_ref();
    let store: &dyn ObjectStore = harness.store.as_ref();
    let mut observed = Vec::new();
    for kind in SubordinateKind::ALL {
        observed.extend(store.list(kind, NAMESPACE, &owner).await.unwrap());
    }
    let stale_plan = plan::plan(Mode::Internal, &desired, None, &observed).unwrap();
    assert_eq!(stale_plan.len(), 1);
    assert!(harness
        .store
        .edit(SubordinateKind::Workload, NAMESPACE, "docs", set_replicas(4)));

    let result = apply::apply(store, stale_plan).await;
    assert_eq!(result.failed.len(), 1);
    assert!(matches!(result.failed[0].1, StoreError::Conflict(_)));
    assert_eq!(workload(&harness).map(|w| w.replicas), Some(4));

    // The next attempt sees the new version and restores the declared value
    let attempt = harness.run(&mut docs).await.unwrap();
    assert_eq!(operations(&attempt), vec!["update workload docs"]);
    assert_eq!(workload(&harness).map(|w| w.replicas), Some(1));
}

#[tokio::test]
async fn test_drift_on_controlled_field_is_repaired() {
    let harness = Harness::new();
    let mut docs = gitea("docs", small());
    harness.run(&mut docs).await.unwrap();

    harness
        .store
        .edit(SubordinateKind::Workload, NAMESPACE, "docs", |spec| {
            if let SubordinateSpec::Workload(workload) = spec {
                workload.image = "gitea/gitea:latest".to_string();
            }
        });

    let attempt = harness.run(&mut docs).await.unwrap();
    assert_eq!(operations(&attempt), vec!["update workload docs"]);
    assert_eq!(
        workload(&harness).map(|w| w.image),
        Some("gitea/gitea:1.22".to_string())
    );
}

#[tokio::test]
async fn test_invalid_declaration_reports_and_waits_for_spec_change() {
    let harness = Harness::new();
    let mut docs = gitea("docs", small());
    harness.run(&mut docs).await.unwrap();
    harness.store.clear_writes();

    docs.spec.secret_ref = Some(SecretRef {
        name: "  ".to_string(),
    });
    common::bump_generation(&mut docs);
    let attempt = harness.run(&mut docs).await.unwrap();

    assert!(attempt.resolution.is_none());
    assert_eq!(attempt.report.requeue, RequeueDirective::None);
    assert!(harness.store.writes().is_empty());
    assert_eq!(
        reason(&docs, CONDITION_READY).as_deref(),
        Some("InvalidDeclaration")
    );
    assert!(is_true(&docs, CONDITION_DEGRADED));
    let status = docs.status.clone().unwrap();
    assert_eq!(status.observed_generation, Some(1));
    assert_eq!(status.resolved_mode, Some(Mode::Internal));
    assert!(workload(&harness).is_some());
}

#[tokio::test]
async fn test_missing_credential_secret_retries_without_touching_subordinates() {
    let harness = Harness::new();
    harness.store.remove_secret(NAMESPACE, EXTERNAL_SECRET);
    let mut docs = gitea("docs", small());
    switch_to_external(&mut docs);

    let attempt = harness.run(&mut docs).await.unwrap();

    assert!(attempt.plan.is_empty());
    assert!(attempt.probe.is_none());
    assert_eq!(attempt.report.reason, RequeueReason::Backoff);
    assert_eq!(
        reason(&docs, CONDITION_CREDENTIAL_RESOLVED).as_deref(),
        Some("CredentialNotFound")
    );
    assert_eq!(
        reason(&docs, CONDITION_SUBORDINATES_SYNCED).as_deref(),
        Some("CredentialUnavailable")
    );
    assert!(harness.store.objects(NAMESPACE).is_empty());
    assert!(harness.prober.probed().is_empty());

    harness
        .store
        .insert_secret(NAMESPACE, EXTERNAL_SECRET, common::external_secret_data());
    harness.run(&mut docs).await.unwrap();
    assert!(is_true(&docs, CONDITION_READY));
}

#[tokio::test]
async fn test_invalid_credential_waits_for_user() {
    let harness = Harness::new();
    harness.store.insert_secret(
        NAMESPACE,
        EXTERNAL_SECRET,
        [("url".to_string(), "git.example.com".to_string())].into(),
    );
    let mut docs = gitea("docs", small());
    switch_to_external(&mut docs);

    let attempt = harness.run(&mut docs).await.unwrap();

    assert_eq!(attempt.report.reason, RequeueReason::AwaitingUser);
    assert_eq!(attempt.report.requeue, STEADY);
    assert_eq!(docs.status.as_ref().map(|s| s.failure_count), Some(0));
    assert_eq!(
        reason(&docs, CONDITION_CREDENTIAL_RESOLVED).as_deref(),
        Some("CredentialInvalid")
    );
}

#[tokio::test]
async fn test_rejected_credential_is_reported_on_credential_condition() {
    let harness = Harness::with_prober(ScriptedProber::always(ProbeOutcome::Unauthorized(
        "401 Unauthorized".to_string(),
    )));
    let mut docs = gitea("docs", small());
    switch_to_external(&mut docs);

    let attempt = harness.run(&mut docs).await.unwrap();

    assert_eq!(attempt.report.reason, RequeueReason::AwaitingUser);
    assert!(!is_true(&docs, CONDITION_READY));
    assert_eq!(
        reason(&docs, CONDITION_CREDENTIAL_RESOLVED).as_deref(),
        Some("Unauthorized")
    );
    assert_eq!(
        reason(&docs, CONDITION_ENDPOINT_REACHABLE).as_deref(),
        Some("Responded")
    );
    // The mirror is still written; only the endpoint rejected it
    assert!(harness
        .store
        .object(SubordinateKind::CredentialMirror, NAMESPACE, "docs-credential")
        .is_some());
}

#[tokio::test]
async fn test_unreachable_endpoint_backs_off_until_it_answers() {
    let harness = Harness::new();
    harness.prober.push(ProbeOutcome::Unreachable(
        "connection refused".to_string(),
    ));
    let mut docs = gitea("docs", small());
    switch_to_external(&mut docs);

    let attempt = harness.run(&mut docs).await.unwrap();
    assert_eq!(attempt.report.reason, RequeueReason::Backoff);
    assert_eq!(
        reason(&docs, CONDITION_ENDPOINT_REACHABLE).as_deref(),
        Some("Unreachable")
    );
    assert!(is_true(&docs, CONDITION_SUBORDINATES_SYNCED));

    let attempt = harness.run(&mut docs).await.unwrap();
    assert!(attempt.plan.is_empty());
    assert!(is_true(&docs, CONDITION_READY));
}

#[tokio::test]
async fn test_foreign_object_at_workload_name_is_not_adopted() {
    let harness = Harness::new();
    harness.store.insert(SubordinateObject {
        name: "docs".to_string(),
        namespace: NAMESPACE.to_string(),
        owner: None,
        spec: SubordinateSpec::Workload(WorkloadSpec {
            image: "nginx:1.27".to_string(),
            replicas: 2,
            cpu: "100m".to_string(),
            memory: "128Mi".to_string(),
            ssh: false,
        }),
        resource_version: None,
    });
    let mut docs = gitea("docs", small());

    let attempt = harness.run(&mut docs).await.unwrap();

    assert_eq!(attempt.apply.failed.len(), 1);
    assert!(matches!(attempt.apply.failed[0].1, StoreError::Rejected(_)));
    assert_eq!(attempt.report.reason, RequeueReason::AwaitingUser);
    assert_eq!(workload(&harness).map(|w| w.image), Some("nginx:1.27".to_string()));
}

#[tokio::test]
async fn test_status_write_failure_is_returned() {
    let harness = Harness::new();
    harness.store.fail_next(
        None,
        StoreOp::WriteStatus,
        StoreError::Unavailable("apiserver restarting".into()),
    );
    let mut docs = gitea("docs", small());

    let result = harness.run(&mut docs).await;

    assert!(matches!(result, Err(ReconcilerError::StoreUnavailable(_))));
    // Subordinate work already done stays done; the next attempt only reports
    assert_eq!(harness.store.objects(NAMESPACE).len(), 2);
    let attempt = harness.run(&mut docs).await.unwrap();
    assert!(attempt.plan.is_empty());
    assert!(is_true(&docs, CONDITION_READY));
}

#[tokio::test]
async fn test_observation_failure_plans_nothing() {
    let harness = Harness::new();
    harness.store.fail_next(
        Some(SubordinateKind::NetworkEndpoint),
        StoreOp::List,
        StoreError::Unavailable("watch cache not ready".into()),
    );
    let mut docs = gitea("docs", small());

    let attempt = harness.run(&mut docs).await.unwrap();

    assert!(attempt.plan.is_empty());
    assert!(harness.store.objects(NAMESPACE).is_empty());
    assert_eq!(
        reason(&docs, CONDITION_SUBORDINATES_SYNCED).as_deref(),
        Some("ObservationFailed")
    );
    assert_eq!(attempt.report.reason, RequeueReason::Backoff);
}

#[tokio::test]
async fn test_missing_uid_is_an_invalid_declaration() {
    let harness = Harness::new();
    let mut docs = gitea("docs", small());
    docs.metadata.uid = None;

    let attempt = harness.run(&mut docs).await.unwrap();

    assert!(attempt.resolution.is_none());
    assert_eq!(attempt.report.requeue, RequeueDirective::None);
    assert!(harness.store.objects(NAMESPACE).is_empty());
}

#[tokio::test]
async fn test_resource_without_namespace_cannot_be_reported() {
    let harness = Harness::new();
    let mut docs = gitea("docs", small());
    docs.metadata.namespace = None;

    let result = harness.run(&mut docs).await;

    assert!(matches!(result, Err(ReconcilerError::InvalidDeclaration(_))));
}
