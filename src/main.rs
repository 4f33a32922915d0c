//! # Invoice Controller
//!
//! Watches `Invoice` resources cluster-wide (or in `WATCH_NAMESPACE`) and
//! converges each one into its document Secret, viewer Deployment, Service
//! and optional Ingress.
//!
//! See the library documentation for the reconcile model and
//! [`invoice_controller::config`] for the environment variables.

use anyhow::Result;
use invoice_controller::runtime::initialization::initialize;
use invoice_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the controller runtime
    let init_result = initialize().await?;

    // Run the watch loop until a shutdown signal arrives
    run_watch_loop(
        init_result.client,
        init_result.reconciler,
        init_result.server_state,
        &init_result.config,
    )
    .await
}
