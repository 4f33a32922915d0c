//! Object store backed by the Kubernetes API server.

use super::{identity, kind_of, ObjectStore, StoreError, StoreObject};
use crate::constants::FIELD_MANAGER;
use crate::crd::{Invoice, InvoiceStatus};
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use std::fmt;
use tracing::debug;

#[derive(Clone, Copy)]
enum Operation {
    Read,
    Create,
    Update,
}

/// [`ObjectStore`] talking to the API server through `kube::Api`
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| classify::<K>(e, Operation::Read, namespace, name))
    }

    async fn create<K: StoreObject>(&self, object: &K) -> Result<K, StoreError> {
        let (namespace, name) = identity(object)?;
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        debug!(kind = %kind_of::<K>(), %namespace, %name, "creating object");
        api.create(&PostParams::default(), object)
            .await
            .map_err(|e| classify::<K>(e, Operation::Create, &namespace, &name))
    }

    async fn update<K: StoreObject>(&self, object: &K) -> Result<K, StoreError> {
        let (namespace, name) = identity(object)?;
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        debug!(
            kind = %kind_of::<K>(),
            %namespace,
            %name,
            resource_version = ?object.meta().resource_version,
            "replacing object"
        );
        api.replace(&name, &PostParams::default(), object)
            .await
            .map_err(|e| classify::<K>(e, Operation::Update, &namespace, &name))
    }

    async fn update_status(
        &self,
        invoice: &Invoice,
        status: &InvoiceStatus,
    ) -> Result<Invoice, StoreError> {
        let (namespace, name) = identity(invoice)?;
        let api: Api<Invoice> = Api::namespaced(self.client.clone(), &namespace);

        // resourceVersion in a merge patch makes the write conditional
        let patch = json!({
            "metadata": { "resourceVersion": invoice.metadata.resource_version },
            "status": status,
        });

        api.patch_status(
            &name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| classify::<Invoice>(e, Operation::Update, &namespace, &name))
    }
}

fn classify<K: StoreObject>(
    error: kube::Error,
    operation: Operation,
    namespace: &str,
    name: &str,
) -> StoreError {
    let kind = kind_of::<K>();
    match error {
        kube::Error::Api(response) if response.code == 404 => StoreError::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(response) if response.code == 409 => match operation {
            Operation::Create => StoreError::AlreadyExists {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            Operation::Read | Operation::Update => StoreError::Conflict {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
                message: response.message.clone(),
            },
        },
        kube::Error::Api(response) if response.code == 429 || response.code >= 500 => {
            StoreError::Unavailable(format!("{} ({})", response.message, response.code))
        }
        kube::Error::Api(response) => {
            StoreError::Api(format!("{} ({})", response.message, response.code))
        }
        kube::Error::SerdeError(e) => StoreError::Serialization {
            kind,
            message: e.to_string(),
        },
        other => StoreError::Unavailable(other.to_string()),
    }
}
