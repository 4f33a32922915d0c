//! # In-Memory Store
//!
//! An [`ObjectStore`] that keeps objects as JSON documents in process.
//!
//! It mimics the parts of the API server the reconciler relies on:
//! `resourceVersion` is bumped on every write and checked on update,
//! `metadata.generation` is bumped when `spec` changes, status is only
//! written through [`ObjectStore::update_status`], and uids are assigned on
//! create. Writes can be made to fail per kind to exercise error paths.

use super::{identity, kind_of, ObjectStore, StoreError, StoreObject};
use crate::crd::{Invoice, InvoiceStatus};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

type ObjectKey = (String, String, String);

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectKey, Value>,
    last_version: u64,
    last_uid: u64,
    writes: usize,
    failing_kinds: HashMap<String, String>,
    failing_status: Option<String>,
}

impl State {
    fn next_version(&mut self) -> String {
        self.last_version += 1;
        self.last_version.to_string()
    }

    fn next_uid(&mut self) -> String {
        self.last_uid += 1;
        format!("00000000-0000-4000-8000-{:012}", self.last_uid)
    }
}

/// In-process [`ObjectStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object without counting it as a write
    ///
    /// Assigns uid, `resourceVersion` and (for objects with a spec) generation 1,
    /// the way the API server does on create.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the object has no name or namespace or cannot be encoded.
    pub fn insert<K: StoreObject>(&self, object: &K) -> Result<K, StoreError> {
        let (namespace, name) = identity(object)?;
        let kind = kind_of::<K>();
        let mut value = encode(object)?;

        let mut state = self.lock();
        stamp_new(&mut state, &mut value);
        let stored = decode::<K>(&value)?;
        state.objects.insert((kind, namespace, name), value);
        Ok(stored)
    }

    /// Synchronous read for assertions
    pub fn object<K: StoreObject>(&self, namespace: &str, name: &str) -> Option<K> {
        let state = self.lock();
        state
            .objects
            .get(&key::<K>(namespace, name))
            .and_then(|value| decode::<K>(value).ok())
    }

    /// Number of stored objects of one kind
    pub fn count<K: StoreObject>(&self) -> usize {
        let kind = kind_of::<K>();
        self.lock()
            .objects
            .keys()
            .filter(|(stored_kind, _, _)| *stored_kind == kind)
            .count()
    }

    /// Number of successful create, update and status writes so far
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Make every create and update of the given kind fail
    pub fn fail_writes_for(&self, kind: &str, message: &str) {
        self.lock()
            .failing_kinds
            .insert(kind.to_string(), message.to_string());
    }

    /// Make every status write fail
    pub fn fail_status_writes(&self, message: &str) {
        self.lock().failing_status = Some(message.to_string());
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing_kinds.clear();
        state.failing_status = None;
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        let state = self.lock();
        state
            .objects
            .get(&key::<K>(namespace, name))
            .map(decode::<K>)
            .transpose()
    }

    async fn create<K: StoreObject>(&self, object: &K) -> Result<K, StoreError> {
        let (namespace, name) = identity(object)?;
        let kind = kind_of::<K>();
        let mut value = encode(object)?;

        let mut state = self.lock();
        if let Some(message) = state.failing_kinds.get(&kind) {
            return Err(StoreError::Unavailable(message.clone()));
        }
        let object_key = (kind.clone(), namespace.clone(), name.clone());
        if state.objects.contains_key(&object_key) {
            return Err(StoreError::AlreadyExists {
                kind,
                namespace,
                name,
            });
        }

        stamp_new(&mut state, &mut value);
        // Status is a subresource; create ignores it
        if let Some(fields) = value.as_object_mut() {
            fields.remove("status");
        }
        let created = decode::<K>(&value)?;
        state.objects.insert(object_key, value);
        state.writes += 1;
        Ok(created)
    }

    async fn update<K: StoreObject>(&self, object: &K) -> Result<K, StoreError> {
        let (namespace, name) = identity(object)?;
        let kind = kind_of::<K>();
        let mut value = encode(object)?;

        let mut state = self.lock();
        if let Some(message) = state.failing_kinds.get(&kind) {
            return Err(StoreError::Unavailable(message.clone()));
        }
        let object_key = (kind.clone(), namespace.clone(), name.clone());
        let Some(stored) = state.objects.get(&object_key).cloned() else {
            return Err(StoreError::NotFound {
                kind,
                namespace,
                name,
            });
        };
        check_version(&stored, &value, &object_key)?;

        value["metadata"]["uid"] = stored["metadata"]["uid"].clone();
        value["metadata"]["generation"] = stored["metadata"]["generation"].clone();
        if value.get("spec") != stored.get("spec") {
            if let Some(generation) = stored["metadata"]["generation"].as_i64() {
                value["metadata"]["generation"] = json!(generation + 1);
            }
        }
        // Status is a subresource; replace keeps the stored one
        match stored.get("status") {
            Some(status) => value["status"] = status.clone(),
            None => {
                if let Some(fields) = value.as_object_mut() {
                    fields.remove("status");
                }
            }
        }
        value["metadata"]["resourceVersion"] = json!(state.next_version());

        let updated = decode::<K>(&value)?;
        state.objects.insert(object_key, value);
        state.writes += 1;
        Ok(updated)
    }

    async fn update_status(
        &self,
        invoice: &Invoice,
        status: &InvoiceStatus,
    ) -> Result<Invoice, StoreError> {
        let (namespace, name) = identity(invoice)?;
        let status = serde_json::to_value(status).map_err(|e| StoreError::Serialization {
            kind: "InvoiceStatus".to_string(),
            message: e.to_string(),
        })?;

        let mut state = self.lock();
        if let Some(message) = &state.failing_status {
            return Err(StoreError::Unavailable(message.clone()));
        }
        let object_key = key::<Invoice>(&namespace, &name);
        let Some(mut stored) = state.objects.get(&object_key).cloned() else {
            return Err(StoreError::NotFound {
                kind: object_key.0,
                namespace,
                name,
            });
        };
        check_version(&stored, &encode(invoice)?, &object_key)?;

        stored["status"] = status;
        stored["metadata"]["resourceVersion"] = json!(state.next_version());

        let updated = decode::<Invoice>(&stored)?;
        state.objects.insert(object_key, stored);
        state.writes += 1;
        Ok(updated)
    }
}

fn key<K: StoreObject>(namespace: &str, name: &str) -> ObjectKey {
    (kind_of::<K>(), namespace.to_string(), name.to_string())
}

fn encode<K: StoreObject>(object: &K) -> Result<Value, StoreError> {
    serde_json::to_value(object).map_err(|e| StoreError::Serialization {
        kind: kind_of::<K>(),
        message: e.to_string(),
    })
}

fn decode<K: StoreObject>(value: &Value) -> Result<K, StoreError> {
    serde_json::from_value(value.clone()).map_err(|e| StoreError::Serialization {
        kind: kind_of::<K>(),
        message: e.to_string(),
    })
}

fn stamp_new(state: &mut State, value: &mut Value) {
    if value["metadata"]["uid"].is_null() {
        value["metadata"]["uid"] = json!(state.next_uid());
    }
    if value.get("spec").is_some() {
        value["metadata"]["generation"] = json!(1);
    }
    value["metadata"]["resourceVersion"] = json!(state.next_version());
}

/// An absent `resourceVersion` is an unconditional write
fn check_version(stored: &Value, incoming: &Value, object_key: &ObjectKey) -> Result<(), StoreError> {
    let incoming_version = &incoming["metadata"]["resourceVersion"];
    if incoming_version.is_null() || *incoming_version == stored["metadata"]["resourceVersion"] {
        return Ok(());
    }
    let (kind, namespace, name) = object_key.clone();
    Err(StoreError::Conflict {
        kind,
        namespace,
        name,
        message: format!(
            "resourceVersion {incoming_version} does not match stored {}",
            stored["metadata"]["resourceVersion"]
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{InvoicePhase, InvoiceSpec};
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    fn config_map(data: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("inv1".to_string()),
                namespace: Some("default".to_string()),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([("key".to_string(), data.to_string())])),
            ..ConfigMap::default()
        }
    }

    fn invoice() -> Invoice {
        let mut invoice = Invoice::new("inv1", InvoiceSpec::default());
        invoice.metadata.namespace = Some("default".to_string());
        invoice
    }

    #[tokio::test]
    async fn test_create_assigns_identity() {
        let store = MemoryStore::new();
        let created = store.create(&config_map("a")).await.unwrap();

        assert!(created.metadata.uid.is_some());
        assert!(created.metadata.resource_version.is_some());
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.count::<ConfigMap>(), 1);

        let err = store.create(&config_map("a")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let store = MemoryStore::new();
        let found: Option<ConfigMap> = store.get("default", "inv1").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_update_checks_resource_version() {
        let store = MemoryStore::new();
        let created = store.create(&config_map("a")).await.unwrap();

        let mut first = created.clone();
        first.data = Some(BTreeMap::from([("key".to_string(), "b".to_string())]));
        let updated = store.update(&first).await.unwrap();
        assert_ne!(updated.metadata.resource_version, created.metadata.resource_version);
        assert_eq!(updated.metadata.uid, created.metadata.uid);

        // Still carries the version read before the first update
        let mut stale = created;
        stale.data = Some(BTreeMap::from([("key".to_string(), "c".to_string())]));
        let err = store.update(&stale).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_update_bumps_generation_on_spec_change() {
        let store = MemoryStore::new();
        let stored = store.insert(&invoice()).unwrap();
        assert_eq!(stored.metadata.generation, Some(1));

        let unchanged = store.update(&stored).await.unwrap();
        assert_eq!(unchanged.metadata.generation, Some(1));

        let mut edited = unchanged;
        edited.spec.invoice_data.number = "A2".to_string();
        let edited = store.update(&edited).await.unwrap();
        assert_eq!(edited.metadata.generation, Some(2));
    }

    #[tokio::test]
    async fn test_status_is_a_subresource() {
        let store = MemoryStore::new();
        let stored = store.insert(&invoice()).unwrap();

        let status = InvoiceStatus {
            phase: InvoicePhase::Success,
            ..InvoiceStatus::default()
        };
        let with_status = store.update_status(&stored, &status).await.unwrap();
        assert_eq!(with_status.status.as_ref().unwrap().phase, InvoicePhase::Success);

        // A spec update with a cleared status must not drop the stored status
        let mut edited = with_status;
        edited.status = None;
        let edited = store.update(&edited).await.unwrap();
        assert_eq!(edited.status.unwrap().phase, InvoicePhase::Success);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new();
        store.fail_writes_for("ConfigMap", "boom");
        let err = store.create(&config_map("a")).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(message) if message == "boom"));

        let stored = store.insert(&invoice()).unwrap();
        store.fail_status_writes("status down");
        assert!(store
            .update_status(&stored, &InvoiceStatus::default())
            .await
            .is_err());

        store.clear_failures();
        assert!(store.create(&config_map("a")).await.is_ok());
        assert!(store
            .update_status(&stored, &InvoiceStatus::default())
            .await
            .is_ok());
    }
}
