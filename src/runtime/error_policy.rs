//! # Error Policy
//!
//! Error handling for the controller watch loop: failed passes the reconciler
//! could not record in status, and watch stream errors.

use crate::constants::FAILURE_REQUEUE_DELAY;
use crate::controller::reconciler::{ReconcileError, Reconciler};
use crate::crd::Invoice;
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{error, warn};

/// Handle a reconcile error returned to the controller
///
/// Only errors that prevent a status write reach this point (the invoice
/// could not be fetched or has no identity). Retries use the same fixed
/// delay as failed passes.
pub fn handle_reconciliation_error<S, G>(
    invoice: Arc<Invoice>,
    error: &ReconcileError,
    _ctx: Arc<Reconciler<S, G>>,
) -> Action {
    let name = invoice.name_any();
    let namespace = invoice.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        invoice.name = %name,
        invoice.namespace = %namespace,
        stage = error.stage(),
    );
    let _error_guard = error_span.enter();

    error!(error = %error, "Reconciliation error for {}/{}", namespace, name);
    observability::metrics::increment_reconciliation_failures(error.stage());
    observability::metrics::increment_requeues_total("error-policy");
    Action::requeue(FAILURE_REQUEUE_DELAY)
}

/// Log an error surfaced by the controller stream
///
/// Failed passes are already handled by [`handle_reconciliation_error`];
/// everything else comes from the watches and is retried by the runtime.
pub fn handle_controller_stream_error<E, Q>(error: &kube_runtime::controller::Error<E, Q>)
where
    E: std::error::Error + 'static,
    Q: std::error::Error + 'static,
{
    use kube_runtime::controller::Error;

    match error {
        Error::ReconcilerFailed(e, object) => {
            warn!(object = %object, error = %e, "Reconcile pass returned an error");
        }
        Error::ObjectNotFound(object) => {
            warn!(object = %object, "Object not found (likely deleted), continuing watch");
        }
        other => {
            error!(error = %other, "Controller stream error");
        }
    }
}
