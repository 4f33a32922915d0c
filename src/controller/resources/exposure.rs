//! # Exposure Route
//!
//! Ingress publishing the viewer Service under the invoice's public URL, and
//! the endpoint address reported in status.
//!
//! Only the host and path of the URL are used. The port is ignored since the
//! ingress controller decides which ports it listens on.

use super::{child_metadata, value_or};
use crate::constants::{DEFAULT_INGRESS_CLASS, VIEWER_PORT};
use crate::crd::{IngressConfig, Invoice, InvoiceSpec};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use kube::ResourceExt;
use thiserror::Error;
use url::{Host, Url};

/// Invalid exposure configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("exposure is enabled but publicURL is empty")]
    MissingPublicUrl,
    #[error("publicURL {url:?} is not a valid URL: {reason}")]
    InvalidPublicUrl { url: String, reason: String },
    #[error("publicURL {url:?} uses unsupported scheme {scheme:?}; expected http or https")]
    UnsupportedScheme { url: String, scheme: String },
    #[error("publicURL {url:?} must name a DNS host, not an IP address")]
    InvalidHost { url: String },
}

/// Host and normalized path prefix of a public URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicUrl {
    pub host: String,
    /// Always starts with `/`, never contains empty segments
    pub path: String,
}

/// Parse a public URL into host and path prefix
///
/// # Errors
///
/// Returns [`ConfigError`] for empty or unparsable URLs, schemes other than
/// http/https, and IP literal hosts.
pub fn parse_public_url(raw: &str) -> Result<PublicUrl, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConfigError::MissingPublicUrl);
    }

    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidPublicUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::UnsupportedScheme {
            url: raw.to_string(),
            scheme: url.scheme().to_string(),
        });
    }

    let host = match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
        _ => {
            return Err(ConfigError::InvalidHost {
                url: raw.to_string(),
            })
        }
    };

    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    Ok(PublicUrl {
        host,
        path: format!("/{}", segments.join("/")),
    })
}

/// Public address of the viewer; empty when exposure is disabled
///
/// # Errors
///
/// Returns [`ConfigError`] when exposure is enabled with an invalid public URL.
pub fn endpoint(spec: &InvoiceSpec) -> Result<String, ConfigError> {
    let Some(ingress) = spec.enabled_ingress() else {
        return Ok(String::new());
    };
    let public_url = parse_public_url(public_url_of(spec))?;
    let scheme = if ingress.tls_enabled { "https" } else { "http" };
    Ok(format!("{scheme}://{}{}", public_url.host, public_url.path))
}

pub(super) fn exposure_route(
    invoice: &Invoice,
    config: &IngressConfig,
) -> Result<Ingress, ConfigError> {
    let public_url = parse_public_url(public_url_of(&invoice.spec))?;

    let mut metadata = child_metadata(invoice);
    if !config.labels.is_empty() {
        let labels = metadata.labels.get_or_insert_with(Default::default);
        for (key, value) in &config.labels {
            // Shared labels identify the child and are not overridable
            labels.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    if !config.annotations.is_empty() {
        metadata.annotations = Some(config.annotations.clone());
    }

    let tls = config.tls_enabled.then(|| {
        let default_secret = format!("{}-tls", public_url.host);
        vec![IngressTLS {
            hosts: Some(vec![public_url.host.clone()]),
            secret_name: Some(value_or(config.tls_secret_name.as_ref(), &default_secret).to_string()),
        }]
    });

    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: invoice.name_any(),
            port: Some(ServiceBackendPort {
                number: Some(VIEWER_PORT),
                ..ServiceBackendPort::default()
            }),
        }),
        ..IngressBackend::default()
    };

    Ok(Ingress {
        metadata,
        spec: Some(IngressSpec {
            ingress_class_name: Some(
                value_or(config.ingress_class_name.as_ref(), DEFAULT_INGRESS_CLASS).to_string(),
            ),
            rules: Some(vec![IngressRule {
                host: Some(public_url.host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(public_url.path),
                        path_type: "Prefix".to_string(),
                        backend,
                    }],
                }),
            }]),
            tls,
            ..IngressSpec::default()
        }),
        ..Ingress::default()
    })
}

fn public_url_of(spec: &InvoiceSpec) -> &str {
    spec.exposure
        .as_ref()
        .and_then(|exposure| exposure.public_url.as_deref())
        .unwrap_or_default()
}
