//! # Reconciler Types
//!
//! The reconciler context, the key it is invoked with and its error type.

use super::apply::ApplyError;
use crate::config::ControllerConfig;
use crate::controller::resources::ConfigError;
use crate::controller::store::{ObjectStore, StoreError};
use crate::crd::Invoice;
use crate::generator::{DocumentGenerator, GenerationError};
use kube::ResourceExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinError;

/// Identity of the invoice a pass works on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvoiceKey {
    pub namespace: String,
    pub name: String,
}

impl InvoiceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an invoice; `None` when name or namespace is missing
    pub fn for_invoice(invoice: &Invoice) -> Option<Self> {
        Some(Self::new(invoice.namespace()?, invoice.metadata.name.clone()?))
    }
}

impl fmt::Display for InvoiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reconcile pass failure
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The invoice could not be read; no status can be written
    #[error("failed to fetch invoice {key}: {source}")]
    Fetch {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("invoice {0} is missing metadata.name, metadata.namespace or metadata.uid")]
    MissingMetadata(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    /// The blocking generation task panicked or was cancelled
    #[error("document generation task failed: {0}")]
    GenerationTask(#[from] JoinError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error("reconcile pass did not finish within {0:?}")]
    Timeout(Duration),
}

impl ReconcileError {
    /// Stage label used in logs and metrics
    pub fn stage(&self) -> &'static str {
        match self {
            ReconcileError::Fetch { .. } => "fetch",
            ReconcileError::MissingMetadata(_) => "metadata",
            ReconcileError::Generation(_) | ReconcileError::GenerationTask(_) => "generation",
            ReconcileError::Config(_) => "config",
            ReconcileError::Apply(_) => "apply",
            ReconcileError::Timeout(_) => "timeout",
        }
    }
}

/// Reconciler context shared by all passes
///
/// Holds no per-invoice state: everything a pass needs is read back from the
/// store.
pub struct Reconciler<S, G> {
    pub(crate) store: S,
    /// Shared with the blocking task that renders the document
    pub(crate) generator: Arc<G>,
    pub(crate) config: ControllerConfig,
    /// Parent span of every pass
    pub(crate) span: tracing::Span,
}

impl<S: ObjectStore, G: DocumentGenerator> Reconciler<S, G> {
    pub fn new(store: S, generator: G, config: ControllerConfig, span: tracing::Span) -> Self {
        Self {
            store,
            generator: Arc::new(generator),
            config,
            span,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, G> fmt::Debug for Reconciler<S, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
