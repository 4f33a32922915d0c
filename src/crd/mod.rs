//! # Custom Resource Definitions
//!
//! CRD types for the Invoice Controller.
//!
//! This module contains the `Invoice` custom resource and the types nested in
//! its spec. Status types live in [`status`], the invoice document itself in
//! [`document`].

pub mod document;
pub mod status;

pub use document::*;
pub use status::*;

use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Invoice Custom Resource Definition
///
/// Declares an invoice document. The controller renders it to PDF and serves
/// it through an owned viewer Deployment, Service and (optionally) Ingress.
///
/// # Example
///
/// ```yaml
/// apiVersion: invoicing.dev/v1
/// kind: Invoice
/// metadata:
///   name: inv1
///   namespace: default
/// spec:
///   invoiceData:
///     number: A1
///     currency: USD
///     items:
///       - description: Consulting
///         quantity: 2
///         unitPrice: 10
///         vatRate: 0.2
///   exposure:
///     publicURL: https://invoices.example.com/inv1
///     ingress:
///       enabled: true
///       tlsEnabled: true
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Invoice",
    group = "invoicing.dev",
    version = "v1",
    namespaced,
    status = "InvoiceStatus",
    shortname = "inv",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.phase"}, {"name":"Endpoint", "type":"string", "jsonPath":".status.endpoint"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSpec {
    /// Invoice document rendered by the generator
    #[serde(default)]
    pub invoice_data: InvoiceData,
    /// Public exposure of the viewer (optional)
    /// When absent, the viewer is only reachable inside the cluster
    #[serde(default)]
    pub exposure: Option<Exposure>,
    /// Viewer workload overrides (optional)
    #[serde(default)]
    pub deployment: Option<WorkloadConfig>,
}

/// Public exposure configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Exposure {
    /// Public URL the invoice is served under (e.g., "https://invoices.example.com/inv1")
    /// Host and path of the URL become the Ingress rule
    #[serde(default, rename = "publicURL")]
    pub public_url: Option<String>,
    /// Ingress settings. The Ingress is only declared when this is present and enabled.
    #[serde(default)]
    pub ingress: Option<IngressConfig>,
}

/// Ingress exposure settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressConfig {
    /// Turn the Ingress object on or off (for example when a LoadBalancer service is used instead)
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Toggle the TLS section of the Ingress
    /// Default: false
    #[serde(default)]
    pub tls_enabled: bool,
    /// Ingress class name
    /// Default: "nginx"
    #[serde(default)]
    pub ingress_class_name: Option<String>,
    /// Overrides the generated name of the TLS certificate Secret ("<host>-tls")
    #[serde(default)]
    pub tls_secret_name: Option<String>,
    /// Annotations added to the Ingress object
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Labels added to the Ingress object
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tls_enabled: false,
            ingress_class_name: None,
            tls_secret_name: None,
            annotations: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }
}

/// Viewer workload overrides
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadConfig {
    /// Container name
    /// Default: "viewer"
    #[serde(default)]
    pub name: Option<String>,
    /// Container image
    /// Default: "viewer:latest"
    #[serde(default)]
    pub image: Option<String>,
    /// Image pull policy (Always, IfNotPresent, Never)
    /// Default: "Never"
    #[serde(default)]
    pub image_pull_policy: Option<String>,
}

fn default_true() -> bool {
    true
}

impl InvoiceSpec {
    /// Ingress settings, but only when exposure is switched on
    pub fn enabled_ingress(&self) -> Option<&IngressConfig> {
        self.exposure
            .as_ref()
            .and_then(|exposure| exposure.ingress.as_ref())
            .filter(|ingress| ingress.enabled)
    }

    /// Whether an exposure route should be declared for this invoice
    pub fn exposure_enabled(&self) -> bool {
        self.enabled_ingress().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingress_enabled_defaults_to_true_when_present() {
        let spec: InvoiceSpec = serde_json::from_value(serde_json::json!({
            "exposure": {
                "publicURL": "https://invoices.example.com",
                "ingress": {}
            }
        }))
        .unwrap();

        assert!(spec.exposure_enabled());
        assert_eq!(
            spec.exposure.unwrap().public_url.as_deref(),
            Some("https://invoices.example.com")
        );
    }

    #[test]
    fn test_exposure_disabled_without_ingress_section() {
        let spec: InvoiceSpec = serde_json::from_value(serde_json::json!({
            "exposure": { "publicURL": "https://invoices.example.com" }
        }))
        .unwrap();
        assert!(!spec.exposure_enabled());

        let spec: InvoiceSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(!spec.exposure_enabled());
    }

    #[test]
    fn test_exposure_explicitly_disabled() {
        let spec: InvoiceSpec = serde_json::from_value(serde_json::json!({
            "exposure": { "ingress": { "enabled": false } }
        }))
        .unwrap();
        assert!(!spec.exposure_enabled());
    }

    #[test]
    fn test_crd_identity() {
        use kube::CustomResourceExt;

        let crd = Invoice::crd();
        assert_eq!(crd.spec.group, "invoicing.dev");
        assert_eq!(crd.spec.names.kind, "Invoice");
        assert_eq!(crd.spec.names.short_names, Some(vec!["inv".to_string()]));
        assert_eq!(crd.spec.scope, "Namespaced");
    }
}
