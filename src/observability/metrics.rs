//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `gitea_operator_reconciliations_total` - Total number of reconciliation attempts
//! - `gitea_operator_reconciliation_errors_total` - Attempts that ended in the error policy
//! - `gitea_operator_reconciliation_duration_seconds` - Duration of reconciliation attempts
//! - `gitea_operator_subordinate_operations_total` - Subordinate writes by kind, operation and outcome
//! - `gitea_operator_probe_outcomes_total` - External connectivity probes by outcome
//! - `gitea_operator_mode_transitions_total` - Mode switches by source and target mode
//! - `gitea_operator_requeues_total` - Completed attempts by requeue reason

use crate::controller::reconciler::subordinate::SubordinateKind;
use crate::crd::Mode;
use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gitea_operator_reconciliations_total",
        "Total number of reconciliation attempts",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gitea_operator_reconciliation_errors_total",
        "Total number of reconciliation attempts that ended in an error",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "gitea_operator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static SUBORDINATE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gitea_operator_subordinate_operations_total",
            "Total number of subordinate object operations by kind, operation and outcome",
        ),
        &["kind", "operation", "outcome"],
    )
    .expect("Failed to create SUBORDINATE_OPERATIONS_TOTAL metric - this should never happen")
});

static PROBE_OUTCOMES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gitea_operator_probe_outcomes_total",
            "Total number of external connectivity probes by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create PROBE_OUTCOMES_TOTAL metric - this should never happen")
});

static MODE_TRANSITIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gitea_operator_mode_transitions_total",
            "Total number of mode transitions",
        ),
        &["from", "to"],
    )
    .expect("Failed to create MODE_TRANSITIONS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gitea_operator_requeues_total",
            "Total number of completed attempts by requeue reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

/// Register all metrics with the shared registry.
///
/// # Errors
///
/// Fails when a metric is already registered.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(SUBORDINATE_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PROBE_OUTCOMES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MODE_TRANSITIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn record_subordinate_operation(kind: SubordinateKind, operation: &str, outcome: &str) {
    SUBORDINATE_OPERATIONS_TOTAL
        .with_label_values(&[kind.as_str(), operation, outcome])
        .inc();
}

pub fn record_probe_outcome(outcome: &str) {
    PROBE_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_mode_transitions(from: Mode, to: Mode) {
    MODE_TRANSITIONS_TOTAL
        .with_label_values(&[from.as_str(), to.as_str()])
        .inc();
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}
