//! # Reconciler Configuration
//!
//! Watch scope, concurrency and per-pass time budget.

use super::env_var_or_default;
use crate::constants::{DEFAULT_MAX_CONCURRENT_RECONCILES, DEFAULT_RECONCILE_TIMEOUT_SECS};
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace to watch; all namespaces when `None`
    pub watch_namespace: Option<String>,
    /// Upper bound on one reconcile pass (generation plus applies)
    pub reconcile_timeout_secs: u64,
    /// Number of distinct invoices reconciled in parallel
    pub max_concurrent_reconciles: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            watch_namespace: std::env::var("WATCH_NAMESPACE")
                .ok()
                .map(|ns| ns.trim().to_string())
                .filter(|ns| !ns.is_empty()),
            reconcile_timeout_secs: env_var_or_default(
                "RECONCILE_TIMEOUT_SECS",
                DEFAULT_RECONCILE_TIMEOUT_SECS,
            ),
            max_concurrent_reconciles: env_var_or_default(
                "MAX_CONCURRENT_RECONCILES",
                DEFAULT_MAX_CONCURRENT_RECONCILES,
            ),
        }
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.watch_namespace, None);
        assert_eq!(config.reconcile_timeout(), Duration::from_secs(120));
        assert_eq!(config.max_concurrent_reconciles, 4);
    }
}
