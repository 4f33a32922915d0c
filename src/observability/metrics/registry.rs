//! # Metrics Registry
//!
//! Prometheus metrics registry setup and registration.

use anyhow::{Context, Result};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::LazyLock;

/// Global Prometheus metrics registry
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Register all metrics with the Prometheus registry
///
/// Must be called once at startup; a second call fails with a duplicate
/// registration error.
///
/// # Errors
///
/// Returns an error if a metric is already registered.
pub fn register_metrics() -> Result<()> {
    super::controller_metrics::register_controller_metrics()
        .context("Failed to register controller metrics")?;
    Ok(())
}

/// Render all registered metrics in the Prometheus text format
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn gather() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not valid UTF-8")
}
