//! # Reconcile Orchestrator
//!
//! One pass: fetch the invoice, generate the document, build and apply the
//! children in order, record the outcome.
//!
//! - Not found: nothing to do, no status write.
//! - Generation, configuration or apply failure: status `Failure`, retry after 15s.
//! - Success: status `Success`, wait for the next change.
//! - Failed status write: retry after 15s.

use super::apply::apply;
use super::status::{mark_failure, mark_pending, mark_success};
use super::types::{InvoiceKey, ReconcileError, Reconciler};
use crate::constants::FAILURE_REQUEUE_DELAY;
use crate::controller::resources;
use crate::controller::store::ObjectStore;
use crate::crd::Invoice;
use crate::generator::{serialize_document, DocumentGenerator};
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

impl<S: ObjectStore, G: DocumentGenerator> Reconciler<S, G> {
    /// Run one reconcile pass for an invoice
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Fetch`] when the invoice cannot be read and
    /// [`ReconcileError::MissingMetadata`] when it has no uid. Every other
    /// failure is recorded in status and turned into a requeue.
    pub async fn reconcile_key(&self, key: &InvoiceKey) -> Result<Action, ReconcileError> {
        let span = info_span!(
            parent: &self.span,
            "reconcile",
            invoice.namespace = %key.namespace,
            invoice.name = %key.name,
        );
        self.run_pass(key).instrument(span).await
    }

    async fn run_pass(&self, key: &InvoiceKey) -> Result<Action, ReconcileError> {
        let started = Instant::now();
        observability::metrics::increment_reconciliations_total();

        let fetched = self
            .store
            .get::<Invoice>(&key.namespace, &key.name)
            .await
            .map_err(|source| ReconcileError::Fetch {
                key: key.to_string(),
                source,
            })?;
        let Some(invoice) = fetched else {
            debug!("Invoice no longer exists, nothing to reconcile");
            return Ok(Action::await_change());
        };
        if invoice.uid().is_none() {
            return Err(ReconcileError::MissingMetadata(key.to_string()));
        }

        // Captured before any write so status reports the spec this pass saw
        let generation = invoice.metadata.generation;
        debug!(generation = ?generation, "Starting reconcile pass");

        let invoice = match mark_pending(&self.store, &invoice).await {
            Ok(invoice) => invoice,
            Err(e) => return Ok(status_write_failed(&e)),
        };

        let timeout = self.config.reconcile_timeout();
        let outcome = tokio::time::timeout(timeout, self.converge(&invoice))
            .await
            .unwrap_or(Err(ReconcileError::Timeout(timeout)));

        let written = match &outcome {
            Ok(endpoint) => mark_success(&self.store, &invoice, generation, endpoint).await,
            Err(e) => mark_failure(&self.store, &invoice, generation, e).await,
        };
        observability::metrics::observe_reconciliation_duration(started.elapsed().as_secs_f64());

        if let Err(e) = written {
            return Ok(status_write_failed(&e));
        }

        match outcome {
            Ok(endpoint) => {
                info!(endpoint = %endpoint, "Invoice reconciled");
                Ok(Action::await_change())
            }
            Err(e) => {
                warn!(
                    stage = e.stage(),
                    error = %e,
                    retry_in_secs = FAILURE_REQUEUE_DELAY.as_secs(),
                    "Reconcile pass failed"
                );
                observability::metrics::increment_reconciliation_failures(e.stage());
                observability::metrics::increment_requeues_total("failure");
                Ok(Action::requeue(FAILURE_REQUEUE_DELAY))
            }
        }
    }

    /// Generate, build and apply; returns the endpoint to report
    async fn converge(&self, invoice: &Invoice) -> Result<String, ReconcileError> {
        let document = serialize_document(&invoice.spec.invoice_data)?;
        // Off the async workers, so the pass timeout also bounds rendering
        let generator = Arc::clone(&self.generator);
        let bytes = tokio::task::spawn_blocking(move || generator.generate(&document)).await??;
        observability::metrics::increment_documents_generated();
        debug!(bytes = bytes.len(), "Document generated");

        for child in resources::build(invoice, &bytes) {
            apply(&self.store, child?, invoice).await?;
        }

        Ok(resources::endpoint(&invoice.spec)?)
    }
}

fn status_write_failed(e: &super::status::StatusWriteError) -> Action {
    error!(
        error = %e,
        retry_in_secs = FAILURE_REQUEUE_DELAY.as_secs(),
        "Failed to write invoice status"
    );
    observability::metrics::increment_requeues_total("status-write");
    Action::requeue(FAILURE_REQUEUE_DELAY)
}

/// Controller entry point
///
/// # Errors
///
/// See [`Reconciler::reconcile_key`].
pub async fn reconcile<S: ObjectStore, G: DocumentGenerator>(
    invoice: Arc<Invoice>,
    ctx: Arc<Reconciler<S, G>>,
) -> Result<Action, ReconcileError> {
    let key = InvoiceKey::for_invoice(&invoice)
        .ok_or_else(|| ReconcileError::MissingMetadata(invoice.name_any()))?;
    ctx.reconcile_key(&key).await
}
