//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and Kubernetes client setup.

use crate::config::{load_config, ControllerConfig, ServerConfig};
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::controller::store::KubeStore;
use crate::crd::Invoice;
use crate::generator::PdfInvoiceGenerator;
use crate::observability;
use anyhow::{anyhow, Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::fmt;
use std::time::Instant;
use tracing::{error, info, warn};

/// The reconciler as wired in production
pub type InvoiceReconciler = Reconciler<KubeStore, PdfInvoiceGenerator>;

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Reconciler context
    pub reconciler: Arc<InvoiceReconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Controller configuration
    pub config: ControllerConfig,
}

impl fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitializationResult")
            .field("reconciler", &self.reconciler)
            .field("server_state", &self.server_state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reconciler setup
///
/// # Errors
///
/// Returns an error if any of the steps above fails.
pub async fn initialize() -> Result<InitializationResult> {
    // Required for rustls 0.23+ before any TLS connection is made
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|existing| {
            anyhow!("Failed to install rustls crypto provider, one is already installed: {existing:?}")
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "invoice_controller=info".into()),
        )
        .init();

    info!("Starting Invoice Controller v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let (config, server_config) = load_config();
    info!(
        watch_namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        reconcile_timeout_secs = config.reconcile_timeout_secs,
        max_concurrent_reconciles = config.max_concurrent_reconciles,
        metrics_port = server_config.metrics_port,
        "Configuration loaded"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
    });

    // Start server in background task
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {:#}", e);
        }
    });

    // Readiness probes should pass as soon as the watch starts
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let reconciler = Arc::new(Reconciler::new(
        KubeStore::new(client.clone()),
        PdfInvoiceGenerator::new(),
        config.clone(),
        tracing::info_span!("controller", component = crate::constants::FIELD_MANAGER),
    ));

    check_crd_queryable(&client, &config).await;

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
        config,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout;
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(server_config.poll_interval).await;
    }
}

/// Log how many invoices exist, or why they cannot be listed
///
/// Existing invoices are reconciled by the initial watch list, so this is
/// diagnostics only and never fails startup.
async fn check_crd_queryable(client: &Client, config: &ControllerConfig) {
    let invoices: Api<Invoice> = match config.watch_namespace.as_deref() {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };

    match invoices.list(&ListParams::default()).await {
        Ok(list) => {
            info!(
                "CRD is queryable, found {} existing Invoice resources",
                list.items.len()
            );
        }
        Err(e) => {
            error!("CRD is not queryable; {}. Is the CRD installed?", e);
            error!("Installation: crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD queryability check failure - controller will retry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_debug<T: fmt::Debug>() {}

    #[test]
    fn test_initialization_result_is_debug() {
        assert_debug::<InitializationResult>();
    }

    #[tokio::test]
    async fn test_wait_for_server_ready_returns_once_ready() {
        let state = Arc::new(ServerState::default());
        state.is_ready.store(true, Ordering::Relaxed);
        let handle = tokio::spawn(std::future::pending::<()>());

        wait_for_server_ready(&state, &handle, &ServerConfig::default())
            .await
            .unwrap();
        handle.abort();
    }

    #[tokio::test]
    async fn test_wait_for_server_ready_fails_when_server_exits() {
        let state = Arc::new(ServerState::default());
        let handle = tokio::spawn(async {});
        tokio::task::yield_now().await;
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }

        let err = wait_for_server_ready(&state, &handle, &ServerConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }
}
