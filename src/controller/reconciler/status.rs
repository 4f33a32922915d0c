//! # Status Management
//!
//! Records the outcome of a reconcile pass on the Invoice status.
//!
//! Writes are skipped when phase, message, endpoint and observed generation
//! are unchanged, since a status write triggers a new watch event and would
//! otherwise loop the controller on its own updates.

use crate::controller::store::{ObjectStore, StoreError};
use crate::crd::{Condition, Invoice, InvoicePhase, InvoiceStatus};
use crate::observability;
use kube::ResourceExt;
use thiserror::Error;
use tracing::{debug, info};

pub const READY_CONDITION: &str = "Ready";

/// Status persistence failure
#[derive(Debug, Error)]
#[error("failed to write status of invoice {key}: {source}")]
pub struct StatusWriteError {
    /// `namespace/name` of the invoice
    pub key: String,
    #[source]
    pub source: StoreError,
}

/// Mark a pass as started on a spec generation that has not been observed yet
///
/// Returns the invoice as stored after the write (or unchanged when nothing
/// was written) so later writes carry a current `resourceVersion`.
///
/// # Errors
///
/// Returns [`StatusWriteError`] when the store rejects the write.
pub async fn mark_pending<S: ObjectStore>(
    store: &S,
    invoice: &Invoice,
) -> Result<Invoice, StatusWriteError> {
    let current = invoice.status.as_ref();
    if current.is_some()
        && current.and_then(|s| s.observed_generation) == invoice.metadata.generation
    {
        return Ok(invoice.clone());
    }

    let next = next_status(
        current,
        InvoicePhase::Pending,
        String::new(),
        current.map(|s| s.endpoint.clone()).unwrap_or_default(),
        current.and_then(|s| s.observed_generation),
        &now(),
    );
    Ok(write(store, invoice, next).await?.unwrap_or_else(|| invoice.clone()))
}

/// Record a successful pass
///
/// Returns whether a write happened.
///
/// # Errors
///
/// Returns [`StatusWriteError`] when the store rejects the write.
pub async fn mark_success<S: ObjectStore>(
    store: &S,
    invoice: &Invoice,
    generation: Option<i64>,
    endpoint: &str,
) -> Result<bool, StatusWriteError> {
    let next = next_status(
        invoice.status.as_ref(),
        InvoicePhase::Success,
        String::new(),
        endpoint.to_string(),
        generation,
        &now(),
    );
    Ok(write(store, invoice, next).await?.is_some())
}

/// Record a failed pass; the previously reported endpoint is kept
///
/// Returns whether a write happened.
///
/// # Errors
///
/// Returns [`StatusWriteError`] when the store rejects the write.
pub async fn mark_failure<S: ObjectStore>(
    store: &S,
    invoice: &Invoice,
    generation: Option<i64>,
    error: &(dyn std::error::Error + Send + Sync),
) -> Result<bool, StatusWriteError> {
    let current = invoice.status.as_ref();
    let next = next_status(
        current,
        InvoicePhase::Failure,
        error.to_string(),
        current.map(|s| s.endpoint.clone()).unwrap_or_default(),
        generation,
        &now(),
    );
    Ok(write(store, invoice, next).await?.is_some())
}

/// Compute the status to record, keeping the Ready condition's transition
/// time unless its status flips
pub fn next_status(
    current: Option<&InvoiceStatus>,
    phase: InvoicePhase,
    message: String,
    endpoint: String,
    observed_generation: Option<i64>,
    now: &str,
) -> InvoiceStatus {
    let (ready, reason) = match phase {
        InvoicePhase::Success => ("True", "ReconciliationSucceeded"),
        InvoicePhase::Failure => ("False", "ReconciliationFailed"),
        InvoicePhase::Pending => ("False", "ReconciliationInProgress"),
    };

    let last_transition_time = current
        .and_then(|s| s.condition(READY_CONDITION))
        .filter(|c| c.status == ready)
        .and_then(|c| c.last_transition_time.clone())
        .unwrap_or_else(|| now.to_string());

    InvoiceStatus {
        phase,
        conditions: vec![Condition {
            r#type: READY_CONDITION.to_string(),
            status: ready.to_string(),
            last_transition_time: Some(last_transition_time),
            reason: Some(reason.to_string()),
            message: (!message.is_empty()).then(|| message.clone()),
        }],
        message,
        endpoint,
        last_processed_time: Some(now.to_string()),
        observed_generation,
    }
}

/// Whether `next` differs from `current` in anything but timestamps
pub fn status_changed(current: Option<&InvoiceStatus>, next: &InvoiceStatus) -> bool {
    current.is_none_or(|current| {
        current.phase != next.phase
            || current.message != next.message
            || current.endpoint != next.endpoint
            || current.observed_generation != next.observed_generation
    })
}

async fn write<S: ObjectStore>(
    store: &S,
    invoice: &Invoice,
    next: InvoiceStatus,
) -> Result<Option<Invoice>, StatusWriteError> {
    if !status_changed(invoice.status.as_ref(), &next) {
        debug!(
            phase = %next.phase,
            "Skipping status update - phase, message, endpoint and generation unchanged"
        );
        return Ok(None);
    }

    match store.update_status(invoice, &next).await {
        Ok(updated) => {
            info!(
                phase = %next.phase,
                observed_generation = ?next.observed_generation,
                endpoint = %next.endpoint,
                "status updated"
            );
            Ok(Some(updated))
        }
        Err(source) => {
            observability::metrics::increment_status_write_errors();
            Err(StatusWriteError {
                key: format!(
                    "{}/{}",
                    invoice.namespace().unwrap_or_default(),
                    invoice.name_any()
                ),
                source,
            })
        }
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::store::MemoryStore;
    use crate::crd::InvoiceSpec;

    const T0: &str = "2024-01-01T00:00:00+00:00";
    const T1: &str = "2024-01-01T00:05:00+00:00";

    fn stored_invoice(store: &MemoryStore) -> Invoice {
        let mut invoice = Invoice::new("inv1", InvoiceSpec::default());
        invoice.metadata.namespace = Some("default".to_string());
        store.insert(&invoice).unwrap()
    }

    #[test]
    fn test_next_status_success() {
        let status = next_status(
            None,
            InvoicePhase::Success,
            String::new(),
            "https://a.example.com/x".to_string(),
            Some(3),
            T0,
        );
        assert_eq!(status.phase, InvoicePhase::Success);
        assert_eq!(status.observed_generation, Some(3));
        assert_eq!(status.last_processed_time.as_deref(), Some(T0));

        let ready = status.condition(READY_CONDITION).unwrap();
        assert_eq!(ready.status, "True");
        assert_eq!(ready.reason.as_deref(), Some("ReconciliationSucceeded"));
        assert_eq!(ready.message, None);
    }

    #[test]
    fn test_transition_time_moves_only_on_flip() {
        let failed = next_status(
            None,
            InvoicePhase::Failure,
            "boom".to_string(),
            String::new(),
            Some(1),
            T0,
        );
        let pending = next_status(
            Some(&failed),
            InvoicePhase::Pending,
            String::new(),
            String::new(),
            Some(1),
            T1,
        );
        assert_eq!(
            pending.condition(READY_CONDITION).unwrap().last_transition_time.as_deref(),
            Some(T0)
        );

        let succeeded = next_status(
            Some(&pending),
            InvoicePhase::Success,
            String::new(),
            String::new(),
            Some(2),
            T1,
        );
        assert_eq!(
            succeeded.condition(READY_CONDITION).unwrap().last_transition_time.as_deref(),
            Some(T1)
        );
    }

    #[test]
    fn test_status_changed_ignores_timestamps() {
        let first = next_status(None, InvoicePhase::Success, String::new(), String::new(), Some(1), T0);
        let second = next_status(Some(&first), InvoicePhase::Success, String::new(), String::new(), Some(1), T1);
        assert!(!status_changed(Some(&first), &second));
        assert!(status_changed(None, &second));

        let newer = next_status(Some(&first), InvoicePhase::Success, String::new(), String::new(), Some(2), T1);
        assert!(status_changed(Some(&first), &newer));
    }

    #[tokio::test]
    async fn test_mark_pending_only_for_unobserved_generation() {
        let store = MemoryStore::new();
        let invoice = stored_invoice(&store);

        let pending = mark_pending(&store, &invoice).await.unwrap();
        let status = pending.status.clone().unwrap();
        assert_eq!(status.phase, InvoicePhase::Pending);
        assert_eq!(status.observed_generation, None);

        assert!(mark_success(&store, &pending, Some(1), "").await.unwrap());
        let observed: Invoice = store.object("default", "inv1").unwrap();
        assert_eq!(observed.status.as_ref().unwrap().observed_generation, Some(1));

        let writes = store.write_count();
        let unchanged = mark_pending(&store, &observed).await.unwrap();
        assert_eq!(unchanged.status.unwrap().phase, InvoicePhase::Success);
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_repeated_outcome_is_not_written() {
        let store = MemoryStore::new();
        let invoice = stored_invoice(&store);

        let error = std::io::Error::other("generator exploded");
        assert!(mark_failure(&store, &invoice, Some(1), &error).await.unwrap());
        let failed: Invoice = store.object("default", "inv1").unwrap();
        let status = failed.status.as_ref().unwrap();
        assert_eq!(status.phase, InvoicePhase::Failure);
        assert_eq!(status.message, "generator exploded");

        assert!(!mark_failure(&store, &failed, Some(1), &error).await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_endpoint() {
        let store = MemoryStore::new();
        let invoice = stored_invoice(&store);
        mark_success(&store, &invoice, Some(1), "http://a.example.com/x")
            .await
            .unwrap();
        let succeeded: Invoice = store.object("default", "inv1").unwrap();

        let error = std::io::Error::other("bad url");
        mark_failure(&store, &succeeded, Some(2), &error).await.unwrap();
        let failed: Invoice = store.object("default", "inv1").unwrap();
        let status = failed.status.unwrap();
        assert_eq!(status.endpoint, "http://a.example.com/x");
        assert_eq!(status.observed_generation, Some(2));
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let store = MemoryStore::new();
        let invoice = stored_invoice(&store);
        store.fail_status_writes("apiserver down");

        let err = mark_success(&store, &invoice, Some(1), "").await.unwrap_err();
        assert_eq!(err.key, "default/inv1");
        assert!(matches!(err.source, StoreError::Unavailable(_)));
    }
}
