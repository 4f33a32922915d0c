//! # Resource Builder
//!
//! Derives the child objects of an [`Invoice`] from its spec and the generated
//! document. Every child is named after the invoice, lives in its namespace
//! and carries the shared viewer labels.
//!
//! Building is pure: no store access, no clock, no randomness. The same
//! invoice and document always produce the same descriptors.

mod data_carrier;
mod exposure;
mod service;
mod workload;

pub use exposure::{endpoint, parse_public_url, ConfigError, PublicUrl};

use crate::constants::FIELD_MANAGER;
use crate::crd::Invoice;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::fmt;

/// `app.kubernetes.io/name` value shared by all children
pub const APP_NAME: &str = "invoice-viewer";

/// Role of a child object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildKind {
    /// Secret holding the generated document
    DataCarrier,
    /// Deployment serving the document
    Workload,
    /// Service in front of the workload
    ServiceEndpoint,
    /// Ingress exposing the service
    ExposureRoute,
}

impl ChildKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChildKind::DataCarrier => "DataCarrier",
            ChildKind::Workload => "Workload",
            ChildKind::ServiceEndpoint => "ServiceEndpoint",
            ChildKind::ExposureRoute => "ExposureRoute",
        }
    }

    /// Kubernetes kind backing this child
    pub fn resource_kind(self) -> &'static str {
        match self {
            ChildKind::DataCarrier => "Secret",
            ChildKind::Workload => "Deployment",
            ChildKind::ServiceEndpoint => "Service",
            ChildKind::ExposureRoute => "Ingress",
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Desired child object, built fresh on every pass
#[derive(Debug, Clone, PartialEq)]
pub enum ChildDescriptor {
    DataCarrier(Secret),
    Workload(Deployment),
    ServiceEndpoint(Service),
    ExposureRoute(Ingress),
}

impl ChildDescriptor {
    pub fn kind(&self) -> ChildKind {
        match self {
            ChildDescriptor::DataCarrier(_) => ChildKind::DataCarrier,
            ChildDescriptor::Workload(_) => ChildKind::Workload,
            ChildDescriptor::ServiceEndpoint(_) => ChildKind::ServiceEndpoint,
            ChildDescriptor::ExposureRoute(_) => ChildKind::ExposureRoute,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ChildDescriptor::DataCarrier(secret) => &secret.metadata,
            ChildDescriptor::Workload(deployment) => &deployment.metadata,
            ChildDescriptor::ServiceEndpoint(service) => &service.metadata,
            ChildDescriptor::ExposureRoute(ingress) => &ingress.metadata,
        }
    }
}

/// Build all child descriptors of an invoice, in apply order
///
/// The exposure route is only present when exposure is enabled; a broken
/// exposure configuration takes its slot as a [`ConfigError`], so the
/// children before it can still be applied.
pub fn build(invoice: &Invoice, document: &[u8]) -> Vec<Result<ChildDescriptor, ConfigError>> {
    let mut children = vec![
        Ok(ChildDescriptor::DataCarrier(data_carrier::data_carrier(
            invoice, document,
        ))),
        Ok(ChildDescriptor::Workload(workload::workload(invoice))),
        Ok(ChildDescriptor::ServiceEndpoint(service::service_endpoint(
            invoice,
        ))),
    ];

    if let Some(ingress) = invoice.spec.enabled_ingress() {
        children.push(exposure::exposure_route(invoice, ingress).map(ChildDescriptor::ExposureRoute));
    }

    children
}

/// Labels placed on every child and used as the workload selector
pub fn labels(invoice_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), APP_NAME.to_string()),
        (
            "app.kubernetes.io/instance".to_string(),
            invoice_name.to_string(),
        ),
        (
            "app.kubernetes.io/managed-by".to_string(),
            FIELD_MANAGER.to_string(),
        ),
    ])
}

/// Name, namespace and labels shared by all children
fn child_metadata(invoice: &Invoice) -> ObjectMeta {
    let name = invoice.name_any();
    ObjectMeta {
        labels: Some(labels(&name)),
        name: Some(name),
        namespace: invoice.namespace(),
        ..ObjectMeta::default()
    }
}

/// Explicit non-empty value, else the default
fn value_or<'a>(value: Option<&'a String>, default: &'a str) -> &'a str {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}
