//! # Observability
//!
//! Prometheus metrics for the controller. Logging goes through `tracing`
//! and is configured at startup.

pub mod metrics;
