//! Prints the Invoice CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use anyhow::{Context, Result};
use invoice_controller::crd::Invoice;
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let yaml = serde_yaml::to_string(&Invoice::crd()).context("Failed to serialize CRD")?;
    print!("{yaml}");
    Ok(())
}
