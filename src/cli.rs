//! # INVCTL CLI
//!
//! Command-line interface for the Invoice Controller.
//!
//! ## Usage
//!
//! ```bash
//! # List Invoice resources with their phase and endpoint
//! invctl list
//!
//! # Show status of an Invoice
//! invctl status --namespace billing --name inv1
//!
//! # Save the generated PDF of an Invoice
//! invctl download --namespace billing --name inv1 --output inv1.pdf
//!
//! # Render a local invoice document without a cluster
//! invctl render invoice.yaml --output invoice.pdf
//!
//! # Trigger a reconcile pass
//! invctl reconcile --namespace billing --name inv1
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use invoice_controller::constants::{DOCUMENT_KEY, FIELD_MANAGER};
use invoice_controller::crd::Invoice;
use invoice_controller::generator::{serialize_document, DocumentGenerator, PdfInvoiceGenerator};
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use std::path::{Path, PathBuf};

/// Annotation touched by `invctl reconcile` to trigger a pass
const RECONCILE_ANNOTATION: &str = "invoicing.dev/reconcile-requested-at";

/// Invoice Controller CLI
#[derive(Parser)]
#[command(name = "invctl")]
#[command(about = "Invoice Controller CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to "default")
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List Invoice resources
    List {
        /// List across all namespaces
        #[arg(short = 'A', long)]
        all_namespaces: bool,
    },
    /// Show status of an Invoice resource
    Status {
        /// Name of the Invoice resource
        #[arg(long)]
        name: String,
    },
    /// Save the generated document of an Invoice resource
    Download {
        /// Name of the Invoice resource
        #[arg(long)]
        name: String,

        /// Output file (defaults to "<name>.pdf")
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Render a local invoice document to PDF
    Render {
        /// Invoice document or Invoice manifest (YAML)
        input: PathBuf,

        /// Output file (defaults to the input file name with a .pdf extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Trigger a reconcile pass by annotating the Invoice resource
    Reconcile {
        /// Name of the Invoice resource
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "invctl=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let namespace = cli.namespace.unwrap_or_else(|| "default".to_string());

    // Rendering works offline
    if let Commands::Render { input, output } = &cli.command {
        return render_command(input, output.as_deref());
    }

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|existing| {
            anyhow::anyhow!("Failed to install rustls crypto provider: {existing:?}")
        })?;
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    match cli.command {
        Commands::List { all_namespaces } => {
            list_command(client, (!all_namespaces).then_some(namespace)).await
        }
        Commands::Status { name } => status_command(client, &namespace, &name).await,
        Commands::Download { name, output } => {
            download_command(client, &namespace, &name, output).await
        }
        Commands::Reconcile { name } => reconcile_command(client, &namespace, &name).await,
        Commands::Render { .. } => Ok(()),
    }
}

/// List Invoice resources
async fn list_command(client: Client, namespace: Option<String>) -> Result<()> {
    let api: Api<Invoice> = match namespace.as_deref() {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };

    let invoices = api
        .list(&ListParams::default())
        .await
        .context("Failed to list Invoice resources")?;

    if invoices.items.is_empty() {
        println!("No Invoice resources found.");
        return Ok(());
    }

    println!(
        "{:<24} {:<16} {:<10} {:<8} {:<40}",
        "NAME", "NAMESPACE", "PHASE", "GEN", "ENDPOINT"
    );
    println!("{}", "-".repeat(100));

    for invoice in invoices.items {
        let status = invoice.status.clone().unwrap_or_default();
        let generation = format!(
            "{}/{}",
            status
                .observed_generation
                .map_or_else(|| "-".to_string(), |g| g.to_string()),
            invoice
                .metadata
                .generation
                .map_or_else(|| "-".to_string(), |g| g.to_string()),
        );
        println!(
            "{:<24} {:<16} {:<10} {:<8} {:<40}",
            invoice.name_any(),
            invoice.namespace().unwrap_or_default(),
            status.phase,
            generation,
            if status.endpoint.is_empty() { "-" } else { &status.endpoint }
        );
    }

    Ok(())
}

/// Show detailed status of an Invoice resource
async fn status_command(client: Client, namespace: &str, name: &str) -> Result<()> {
    let api: Api<Invoice> = Api::namespaced(client, namespace);
    let invoice = api
        .get(name)
        .await
        .with_context(|| format!("Failed to get Invoice '{namespace}/{name}'"))?;

    println!("Status for Invoice '{namespace}/{name}':\n");
    println!("Metadata:");
    if let Some(generation) = invoice.metadata.generation {
        println!("  Generation: {generation}");
    }

    println!("\nSpec:");
    println!("  Number: {}", invoice.spec.invoice_data.number);
    println!("  Items: {}", invoice.spec.invoice_data.items.len());
    println!(
        "  Exposure: {}",
        if invoice.spec.exposure_enabled() { "enabled" } else { "disabled" }
    );

    let Some(status) = invoice.status else {
        println!("\nStatus: No status available (resource may not have been reconciled yet)");
        return Ok(());
    };

    println!("\nStatus:");
    println!("  Phase: {}", status.phase);
    if !status.message.is_empty() {
        println!("  Message: {}", status.message);
    }
    if !status.endpoint.is_empty() {
        println!("  Endpoint: {}", status.endpoint);
    }
    if let Some(generation) = status.observed_generation {
        println!("  Observed Generation: {generation}");
    }
    if let Some(time) = &status.last_processed_time {
        println!("  Last Processed: {time}");
    }

    if !status.conditions.is_empty() {
        println!("\nConditions:");
        for condition in &status.conditions {
            println!("  {}: {}", condition.r#type, condition.status);
            if let Some(reason) = &condition.reason {
                println!("    Reason: {reason}");
            }
            if let Some(message) = &condition.message {
                println!("    Message: {message}");
            }
            if let Some(time) = &condition.last_transition_time {
                println!("    Last Transition: {time}");
            }
        }
    }

    Ok(())
}

/// Save the document stored in the invoice's Secret
async fn download_command(
    client: Client,
    namespace: &str,
    name: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let api: Api<Secret> = Api::namespaced(client, namespace);
    let secret = api
        .get(name)
        .await
        .with_context(|| format!("Failed to get Secret '{namespace}/{name}'"))?;

    let Some(document) = secret.data.and_then(|mut data| data.remove(DOCUMENT_KEY)) else {
        bail!("Secret '{namespace}/{name}' has no '{DOCUMENT_KEY}' entry; has the invoice been reconciled?");
    };

    let output = output.unwrap_or_else(|| PathBuf::from(format!("{name}.pdf")));
    std::fs::write(&output, &document.0)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Saved {} bytes to {}", document.0.len(), output.display());
    Ok(())
}

/// Render a local invoice document with the controller's generator
fn render_command(input: &Path, output: Option<&Path>) -> Result<()> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let document = document_from_file(&content)?;

    let bytes = PdfInvoiceGenerator::new()
        .generate(&document)
        .context("Failed to render invoice")?;

    let output = output.map_or_else(|| input.with_extension("pdf"), Path::to_path_buf);
    std::fs::write(&output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Rendered {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

/// Accept either a bare invoice document or a full Invoice manifest
fn document_from_file(content: &str) -> Result<String> {
    let value: serde_yaml::Value = serde_yaml::from_str(content).context("Input is not valid YAML")?;
    if value.get("kind").and_then(serde_yaml::Value::as_str) == Some("Invoice") {
        let invoice: Invoice =
            serde_yaml::from_value(value).context("Input is not a valid Invoice manifest")?;
        return serialize_document(&invoice.spec.invoice_data)
            .context("Failed to serialize invoice data");
    }
    Ok(content.to_string())
}

/// Touch an annotation so the controller sees a change and reconciles
async fn reconcile_command(client: Client, namespace: &str, name: &str) -> Result<()> {
    let api: Api<Invoice> = Api::namespaced(client, namespace);
    let timestamp = chrono::Utc::now().to_rfc3339();

    let patch = json!({
        "metadata": {
            "annotations": {
                RECONCILE_ANNOTATION: timestamp
            }
        }
    });

    api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
        .await
        .with_context(|| format!("Failed to trigger reconciliation for '{namespace}/{name}'"))?;

    println!("Reconciliation triggered for Invoice '{namespace}/{name}' at {timestamp}");
    Ok(())
}
