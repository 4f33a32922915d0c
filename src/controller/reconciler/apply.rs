//! # Convergence Applier
//!
//! Create-or-update of a single child object.
//!
//! - Absent: the desired object is created with the owner reference attached.
//! - Present: only the fields this controller owns are copied into the live
//!   object. Labels and annotations are merged in; a key is removed only when
//!   an earlier apply wrote it (recorded in `invoicing.dev/managed-metadata`)
//!   and it is no longer desired. When the result equals the live object
//!   nothing is written.
//!
//! Updates carry the live `resourceVersion`, so a concurrent writer surfaces
//! as a conflict instead of being overwritten.

use crate::constants::{MANAGED_METADATA_ANNOTATION, TEMPLATE_HASH_ANNOTATION};
use crate::controller::resources::{ChildDescriptor, ChildKind};
use crate::controller::store::{identity, ObjectStore, StoreError, StoreObject};
use crate::crd::Invoice;
use crate::observability;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::Resource;
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

/// A child kind managed by the applier
pub trait OwnedObject: StoreObject + PartialEq {
    const KIND: ChildKind;

    /// Copy the fields owned by this controller from `desired` into `live`
    fn converge(live: &mut Self, desired: &Self);
}

impl OwnedObject for Secret {
    const KIND: ChildKind = ChildKind::DataCarrier;

    fn converge(live: &mut Self, desired: &Self) {
        live.data.clone_from(&desired.data);
        live.string_data = None;
    }
}

impl OwnedObject for Deployment {
    const KIND: ChildKind = ChildKind::Workload;

    fn converge(live: &mut Self, desired: &Self) {
        // API-server defaulting rewrites the live template, so drift is
        // judged on the hash recorded at the last write
        let desired_hash = template_hash(desired);
        let template_current = desired_hash.is_some() && template_hash(live) == desired_hash;

        match (live.spec.as_mut(), desired.spec.as_ref()) {
            (Some(live_spec), Some(desired_spec)) => {
                live_spec.selector.clone_from(&desired_spec.selector);
                if !template_current {
                    live_spec.template.clone_from(&desired_spec.template);
                }
            }
            (None, Some(_)) => live.spec.clone_from(&desired.spec),
            (_, None) => {}
        }
    }
}

impl OwnedObject for Service {
    const KIND: ChildKind = ChildKind::ServiceEndpoint;

    fn converge(live: &mut Self, desired: &Self) {
        // clusterIP is allocated by the platform and stays untouched
        match (live.spec.as_mut(), desired.spec.as_ref()) {
            (Some(live_spec), Some(desired_spec)) => {
                live_spec.selector.clone_from(&desired_spec.selector);
                live_spec.ports.clone_from(&desired_spec.ports);
                live_spec.type_.clone_from(&desired_spec.type_);
            }
            (None, Some(_)) => live.spec.clone_from(&desired.spec),
            (_, None) => {}
        }
    }
}

impl OwnedObject for Ingress {
    const KIND: ChildKind = ChildKind::ExposureRoute;

    fn converge(live: &mut Self, desired: &Self) {
        live.spec.clone_from(&desired.spec);
    }
}

/// Outcome of applying one child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedResult {
    Created,
    Updated,
    Unchanged,
}

impl AppliedResult {
    pub fn as_str(self) -> &'static str {
        match self {
            AppliedResult::Created => "created",
            AppliedResult::Updated => "updated",
            AppliedResult::Unchanged => "unchanged",
        }
    }
}

/// Store operation that failed while applying a child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOperation {
    Prepare,
    Get,
    Create,
    Update,
}

impl fmt::Display for ApplyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ApplyOperation::Prepare => "prepare",
            ApplyOperation::Get => "get",
            ApplyOperation::Create => "create",
            ApplyOperation::Update => "update",
        })
    }
}

/// Failure to converge one child
#[derive(Debug, Error)]
#[error("failed to {operation} {child_kind} ({}): {cause}", child_kind.resource_kind())]
pub struct ApplyError {
    pub operation: ApplyOperation,
    pub child_kind: ChildKind,
    #[source]
    pub cause: StoreError,
}

impl ApplyError {
    fn new(operation: ApplyOperation, child_kind: ChildKind, cause: StoreError) -> Self {
        Self {
            operation,
            child_kind,
            cause,
        }
    }

    /// Whether the failure may clear up on its own (conflicts, races, outages)
    pub fn is_retryable(&self) -> bool {
        self.cause.is_retryable()
    }
}

/// Converge one child descriptor against the store
///
/// # Errors
///
/// Returns [`ApplyError`] when the owner lacks identity or a store call fails.
pub async fn apply<S: ObjectStore>(
    store: &S,
    descriptor: ChildDescriptor,
    owner: &Invoice,
) -> Result<AppliedResult, ApplyError> {
    match descriptor {
        ChildDescriptor::DataCarrier(secret) => apply_owned(store, secret, owner).await,
        ChildDescriptor::Workload(deployment) => apply_owned(store, deployment, owner).await,
        ChildDescriptor::ServiceEndpoint(service) => apply_owned(store, service, owner).await,
        ChildDescriptor::ExposureRoute(ingress) => apply_owned(store, ingress, owner).await,
    }
}

/// Create-or-update of one typed child
///
/// # Errors
///
/// Returns [`ApplyError`] when the owner lacks identity or a store call fails.
pub async fn apply_owned<S: ObjectStore, K: OwnedObject>(
    store: &S,
    mut desired: K,
    owner: &Invoice,
) -> Result<AppliedResult, ApplyError> {
    let owner_ref = owner.controller_owner_ref(&()).ok_or_else(|| {
        ApplyError::new(
            ApplyOperation::Prepare,
            K::KIND,
            StoreError::MissingMetadata("Invoice".to_string()),
        )
    })?;
    let (namespace, name) =
        identity(&desired).map_err(|e| ApplyError::new(ApplyOperation::Prepare, K::KIND, e))?;
    ensure_owner_reference(desired.meta_mut(), &owner_ref);
    let managed = ManagedKeys::of(desired.meta());
    managed.record(desired.meta_mut());

    let live = store
        .get::<K>(&namespace, &name)
        .await
        .map_err(|e| ApplyError::new(ApplyOperation::Get, K::KIND, e))?;

    let result = match live {
        None => {
            store
                .create(&desired)
                .await
                .map_err(|e| ApplyError::new(ApplyOperation::Create, K::KIND, e))?;
            AppliedResult::Created
        }
        Some(live) => {
            let mut merged = live.clone();
            K::converge(&mut merged, &desired);
            let previous = ManagedKeys::recorded(live.meta());
            merge_metadata(merged.meta_mut(), desired.meta(), &previous, &owner_ref);

            if merged == live {
                AppliedResult::Unchanged
            } else {
                // merged still carries the live resourceVersion
                store
                    .update(&merged)
                    .await
                    .map_err(|e| ApplyError::new(ApplyOperation::Update, K::KIND, e))?;
                AppliedResult::Updated
            }
        }
    };

    observability::metrics::increment_child_applies(K::KIND.as_str(), result.as_str());
    match result {
        AppliedResult::Unchanged => debug!(
            child.kind = %K::KIND,
            child.name = %name,
            "child already converged"
        ),
        AppliedResult::Created | AppliedResult::Updated => info!(
            child.kind = %K::KIND,
            child.name = %name,
            result = result.as_str(),
            "child applied"
        ),
    }
    Ok(result)
}

/// Add or refresh the controller reference to the owner
fn ensure_owner_reference(meta: &mut ObjectMeta, owner_ref: &OwnerReference) {
    let references = meta.owner_references.get_or_insert_with(Vec::new);
    match references.iter_mut().find(|r| r.uid == owner_ref.uid) {
        Some(existing) if existing == owner_ref => {}
        Some(existing) => existing.clone_from(owner_ref),
        None => references.push(owner_ref.clone()),
    }
}

fn template_hash(deployment: &Deployment) -> Option<&str> {
    deployment
        .metadata
        .annotations
        .as_ref()?
        .get(TEMPLATE_HASH_ANNOTATION)
        .map(String::as_str)
}

/// Label and annotation keys written by the last apply
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
struct ManagedKeys {
    #[serde(default)]
    labels: BTreeSet<String>,
    #[serde(default)]
    annotations: BTreeSet<String>,
}

impl ManagedKeys {
    fn of(meta: &ObjectMeta) -> Self {
        let keys = |map: Option<&BTreeMap<String, String>>| -> BTreeSet<String> {
            map.into_iter()
                .flat_map(BTreeMap::keys)
                .filter(|key| key.as_str() != MANAGED_METADATA_ANNOTATION)
                .cloned()
                .collect()
        };
        Self {
            labels: keys(meta.labels.as_ref()),
            annotations: keys(meta.annotations.as_ref()),
        }
    }

    /// Keys recorded on a live object; empty when absent or unreadable
    fn recorded(meta: &ObjectMeta) -> Self {
        meta.annotations
            .as_ref()
            .and_then(|annotations| annotations.get(MANAGED_METADATA_ANNOTATION))
            .and_then(|value| serde_json::from_str(value).ok())
            .unwrap_or_default()
    }

    fn record(&self, meta: &mut ObjectMeta) {
        let value = json!({
            "labels": self.labels,
            "annotations": self.annotations,
        });
        meta.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(MANAGED_METADATA_ANNOTATION.to_string(), value.to_string());
    }
}

fn merge_metadata(
    live: &mut ObjectMeta,
    desired: &ObjectMeta,
    previous: &ManagedKeys,
    owner_ref: &OwnerReference,
) {
    merge_map(&mut live.labels, desired.labels.as_ref(), &previous.labels);
    merge_map(
        &mut live.annotations,
        desired.annotations.as_ref(),
        &previous.annotations,
    );
    ensure_owner_reference(live, owner_ref);
}

/// Drop previously managed keys that are no longer desired, then add the desired ones
fn merge_map(
    live: &mut Option<BTreeMap<String, String>>,
    desired: Option<&BTreeMap<String, String>>,
    previous: &BTreeSet<String>,
) {
    if let Some(map) = live.as_mut() {
        map.retain(|key, _| {
            !previous.contains(key) || desired.is_some_and(|desired| desired.contains_key(key))
        });
    }

    let Some(desired) = desired.filter(|d| !d.is_empty()) else {
        return;
    };
    let live = live.get_or_insert_with(BTreeMap::new);
    for (key, value) in desired {
        if live.get(key) != Some(value) {
            live.insert(key.clone(), value.clone());
        }
    }
}
