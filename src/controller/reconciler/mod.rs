//! # Reconciler
//!
//! Converges an `Invoice` into its owned children and reports the outcome.
//!
//! - [`apply`]: create-or-update of one child with ownership attached
//! - [`status`]: phase, message, endpoint and observed generation
//! - [`reconcile`]: the pass itself and the controller entry point

pub mod apply;
pub mod reconcile;
pub mod status;
pub mod types;

pub use apply::{apply, apply_owned, AppliedResult, ApplyError, ApplyOperation, OwnedObject};
pub use reconcile::reconcile;
pub use status::{mark_failure, mark_pending, mark_success, StatusWriteError};
pub use types::{InvoiceKey, ReconcileError, Reconciler};
