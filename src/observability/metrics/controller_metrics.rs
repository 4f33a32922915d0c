//! # Controller Metrics
//!
//! Metrics for reconcile passes: outcomes, duration, child applies, status
//! writes and requeues.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec};
use std::sync::LazyLock;

// Reconcile pass metrics
static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "invoice_controller_reconciliations_total",
        "Total number of reconcile passes",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_FAILURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "invoice_controller_reconciliation_failures_total",
            "Total number of failed reconcile passes by stage",
        ),
        &["stage"],
    )
    .expect("Failed to create RECONCILIATION_FAILURES_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "invoice_controller_reconciliation_duration_seconds",
            "Duration of reconcile passes in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

// Child object metrics
static CHILD_APPLIES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "invoice_controller_child_applies_total",
            "Total number of child applies by child kind and result",
        ),
        &["kind", "result"],
    )
    .expect("Failed to create CHILD_APPLIES_TOTAL metric - this should never happen")
});

static DOCUMENTS_GENERATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "invoice_controller_documents_generated_total",
        "Total number of generated invoice documents",
    )
    .expect("Failed to create DOCUMENTS_GENERATED_TOTAL metric - this should never happen")
});

static STATUS_WRITE_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "invoice_controller_status_write_errors_total",
        "Total number of failed invoice status writes",
    )
    .expect("Failed to create STATUS_WRITE_ERRORS_TOTAL metric - this should never happen")
});

// Requeue metrics
static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "invoice_controller_requeues_total",
            "Total number of reconcile requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(CHILD_APPLIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DOCUMENTS_GENERATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATUS_WRITE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations_total() {
    RECONCILIATIONS_TOTAL.inc();
}

/// Count a failed pass under the stage it failed in
pub fn increment_reconciliation_failures(stage: &str) {
    RECONCILIATION_FAILURES_TOTAL
        .with_label_values(&[stage])
        .inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_child_applies(kind: &str, result: &str) {
    CHILD_APPLIES_TOTAL.with_label_values(&[kind, result]).inc();
}

pub fn increment_documents_generated() {
    DOCUMENTS_GENERATED_TOTAL.inc();
}

pub fn increment_status_write_errors() {
    STATUS_WRITE_ERRORS_TOTAL.inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}
