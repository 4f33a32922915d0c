//! # Probe Server Settings
//!
//! Port of the `/metrics`, `/healthz` and `/readyz` listener, and how long
//! startup waits for it to bind before giving up.

use super::env_var_or_default;
use crate::constants::{
    DEFAULT_METRICS_PORT, DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listener port (`METRICS_PORT`)
    pub metrics_port: u16,
    /// Startup fails if the listener is not bound within this (`SERVER_STARTUP_TIMEOUT_SECS`)
    pub startup_timeout: Duration,
    /// `SERVER_POLL_INTERVAL_MS`, never below 1ms
    pub poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_METRICS_PORT,
            DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            DEFAULT_SERVER_POLL_INTERVAL_MS,
        )
    }
}

impl ServerConfig {
    fn new(metrics_port: u16, startup_timeout_secs: u64, poll_interval_ms: u64) -> Self {
        Self {
            metrics_port,
            startup_timeout: Duration::from_secs(startup_timeout_secs),
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            env_var_or_default("SERVER_POLL_INTERVAL_MS", DEFAULT_SERVER_POLL_INTERVAL_MS),
        )
    }
}
