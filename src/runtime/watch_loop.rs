//! # Watch Loop
//!
//! Runs the kube-runtime controller for Invoices and the children they own.
//! A change to any owned Secret, Deployment, Service or Ingress triggers a
//! pass for its owning Invoice.

use super::error_policy::{handle_controller_stream_error, handle_reconciliation_error};
use super::initialization::InvoiceReconciler;
use crate::config::ControllerConfig;
use crate::controller::reconciler::reconcile;
use crate::controller::server::ServerState;
use crate::controller::store::KubeStore;
use crate::crd::Invoice;
use crate::generator::PdfInvoiceGenerator;
use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use kube_runtime::{controller, watcher, Controller};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

/// Run the controller until a shutdown signal arrives
///
/// # Errors
///
/// Currently infallible once started; the signature leaves room for
/// startup failures.
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<InvoiceReconciler>,
    server_state: Arc<ServerState>,
    config: &ControllerConfig,
) -> Result<()> {
    let namespace = config.watch_namespace.as_deref();

    Controller::new(scoped::<Invoice>(&client, namespace), watcher::Config::default())
        .owns(scoped::<Secret>(&client, namespace), watcher::Config::default())
        .owns(scoped::<Deployment>(&client, namespace), watcher::Config::default())
        .owns(scoped::<Service>(&client, namespace), watcher::Config::default())
        .owns(scoped::<Ingress>(&client, namespace), watcher::Config::default())
        .with_config(controller::Config::default().concurrency(config.max_concurrent_reconciles))
        .shutdown_on_signal()
        .run(
            reconcile::<KubeStore, PdfInvoiceGenerator>,
            handle_reconciliation_error::<KubeStore, PdfInvoiceGenerator>,
            reconciler,
        )
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => {
                    debug!(object = %object, action = ?action, "Reconcile pass finished");
                }
                Err(e) => handle_controller_stream_error(&e),
            }
        })
        .await;

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("Controller stopped");
    Ok(())
}

fn scoped<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}
