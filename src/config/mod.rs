//! # Controller Configuration
//!
//! Controller-level configuration loaded from environment variables (populated from ConfigMap).
//!
//! All configuration has sensible defaults and can be overridden via environment variables.
//! Environment variables are populated from a ConfigMap using `envFrom` in the deployment.

mod controller;
mod server;

pub use controller::ControllerConfig;
pub use server::ServerConfig;

/// Load configuration from environment variables with defaults
pub fn load_config() -> (ControllerConfig, ServerConfig) {
    (ControllerConfig::from_env(), ServerConfig::from_env())
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_or_default_falls_back_when_unset() {
        let value: u16 = env_var_or_default("INVOICE_CONTROLLER_TEST_UNSET_VARIABLE", 42);
        assert_eq!(value, 42);
    }
}
