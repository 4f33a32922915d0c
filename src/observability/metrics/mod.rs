//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text exposition
//! - `controller_metrics` - Reconcile passes, child applies, status writes and requeues

pub mod controller_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use registry::*;
