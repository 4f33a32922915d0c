//! # Object Store
//!
//! The state store the reconciler converges against. Production traffic goes
//! to the Kubernetes API server through [`KubeStore`]; [`MemoryStore`] keeps
//! objects in process for tests and offline dry runs.
//!
//! Writes are optimistic: updates carry the `resourceVersion` that was read,
//! and a stale version surfaces as [`StoreError::Conflict`].

mod kubernetes;
mod memory;

pub use kubernetes::KubeStore;
pub use memory::MemoryStore;

use crate::crd::{Invoice, InvoiceStatus};
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// Namespaced object that can be read from and written to an [`ObjectStore`]
pub trait StoreObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoreObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Store access failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: String,
        namespace: String,
        name: String,
    },
    /// The object changed since it was read
    #[error("conflicting write to {kind} {namespace}/{name}: {message}")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
        message: String,
    },
    #[error("{0} is missing metadata.name, metadata.namespace or metadata.uid")]
    MissingMetadata(String),
    #[error("unable to encode {kind}: {message}")]
    Serialization { kind: String, message: String },
    /// The store rejected the request
    #[error("store rejected the request: {0}")]
    Api(String),
    /// The store could not be reached
    #[error("store is unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether a later attempt can succeed without a spec change
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::AlreadyExists { .. } | StoreError::Conflict { .. } | StoreError::Unavailable(_)
        )
    }
}

/// Async access to namespaced objects
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read an object; `Ok(None)` when it does not exist
    async fn get<K: StoreObject>(&self, namespace: &str, name: &str)
        -> Result<Option<K>, StoreError>;

    /// Create an object that must not exist yet
    async fn create<K: StoreObject>(&self, object: &K) -> Result<K, StoreError>;

    /// Replace an existing object, guarded by the `resourceVersion` it carries
    async fn update<K: StoreObject>(&self, object: &K) -> Result<K, StoreError>;

    /// Persist the status sub-object of an invoice, guarded by its `resourceVersion`
    async fn update_status(
        &self,
        invoice: &Invoice,
        status: &InvoiceStatus,
    ) -> Result<Invoice, StoreError>;
}

/// Kind name of a store object type
pub(crate) fn kind_of<K: StoreObject>() -> String {
    K::kind(&()).into_owned()
}

/// Namespace and name of an object
pub(crate) fn identity<K: StoreObject>(object: &K) -> Result<(String, String), StoreError> {
    let meta = object.meta();
    match (meta.namespace.as_deref(), meta.name.as_deref()) {
        (Some(namespace), Some(name)) if !namespace.is_empty() && !name.is_empty() => {
            Ok((namespace.to_string(), name.to_string()))
        }
        _ => Err(StoreError::MissingMetadata(kind_of::<K>())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;

    #[test]
    fn test_identity_requires_name_and_namespace() {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("inv1".to_string()),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        };
        assert!(matches!(
            identity(&secret),
            Err(StoreError::MissingMetadata(kind)) if kind == "Secret"
        ));

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("inv1".to_string()),
                namespace: Some("default".to_string()),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        };
        assert_eq!(
            identity(&secret).unwrap(),
            ("default".to_string(), "inv1".to_string())
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(StoreError::Unavailable("timeout".to_string()).is_retryable());
        assert!(StoreError::Conflict {
            kind: "Secret".to_string(),
            namespace: "default".to_string(),
            name: "inv1".to_string(),
            message: "stale".to_string(),
        }
        .is_retryable());
        assert!(!StoreError::Api("forbidden".to_string()).is_retryable());
    }
}
