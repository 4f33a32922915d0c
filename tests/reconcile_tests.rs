//! End-to-end reconcile passes against the in-memory store.

use async_trait::async_trait;
use invoice_controller::config::ControllerConfig;
use invoice_controller::controller::reconciler::{InvoiceKey, Reconciler};
use invoice_controller::controller::store::{MemoryStore, ObjectStore, StoreError, StoreObject};
use invoice_controller::crd::{Invoice, InvoicePhase, InvoiceSpec, InvoiceStatus, WorkloadConfig};
use invoice_controller::generator::{DocumentGenerator, GenerationError, PdfInvoiceGenerator};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::Resource;
use kube_runtime::controller::Action;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

const NAMESPACE: &str = "billing";
const NAME: &str = "inv1";

/// Returns a fixed-size document
struct FixedGenerator(usize);

impl DocumentGenerator for FixedGenerator {
    fn generate(&self, _document: &str) -> Result<Vec<u8>, GenerationError> {
        Ok(vec![b'x'; self.0])
    }
}

/// Always rejects the document
struct FailingGenerator;

impl DocumentGenerator for FailingGenerator {
    fn generate(&self, _document: &str) -> Result<Vec<u8>, GenerationError> {
        Err(GenerationError::MissingField("items"))
    }
}

/// Delays every create
struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

#[async_trait]
impl ObjectStore for SlowStore {
    async fn get<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        self.inner.get(namespace, name).await
    }

    async fn create<K: StoreObject>(&self, object: &K) -> Result<K, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.create(object).await
    }

    async fn update<K: StoreObject>(&self, object: &K) -> Result<K, StoreError> {
        self.inner.update(object).await
    }

    async fn update_status(
        &self,
        invoice: &Invoice,
        status: &InvoiceStatus,
    ) -> Result<Invoice, StoreError> {
        self.inner.update_status(invoice, status).await
    }
}

/// Another writer touches every object right before it is updated
struct RacingStore {
    inner: MemoryStore,
}

#[async_trait]
impl ObjectStore for RacingStore {
    async fn get<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        self.inner.get(namespace, name).await
    }

    async fn create<K: StoreObject>(&self, object: &K) -> Result<K, StoreError> {
        self.inner.create(object).await
    }

    async fn update<K: StoreObject>(&self, object: &K) -> Result<K, StoreError> {
        let namespace = object.meta().namespace.clone().unwrap_or_default();
        let name = object.meta().name.clone().unwrap_or_default();
        if let Some(mut current) = self.inner.get::<K>(&namespace, &name).await? {
            current
                .meta_mut()
                .labels
                .get_or_insert_with(BTreeMap::new)
                .insert("touched-by".to_string(), "other".to_string());
            self.inner.update(&current).await?;
        }
        self.inner.update(object).await
    }

    async fn update_status(
        &self,
        invoice: &Invoice,
        status: &InvoiceStatus,
    ) -> Result<Invoice, StoreError> {
        self.inner.update_status(invoice, status).await
    }
}

fn spec(exposure: serde_json::Value) -> InvoiceSpec {
    serde_json::from_value(json!({
        "invoiceData": {
            "number": "A1",
            "currency": "USD",
            "items": [
                { "description": "x", "quantity": 2, "unitPrice": 10, "vatRate": 0.2 }
            ]
        },
        "exposure": exposure
    }))
    .unwrap()
}

fn without_exposure() -> InvoiceSpec {
    spec(json!({ "ingress": { "enabled": false } }))
}

fn with_exposure(public_url: &str, tls_enabled: bool) -> InvoiceSpec {
    spec(json!({
        "publicURL": public_url,
        "ingress": { "enabled": true, "tlsEnabled": tls_enabled }
    }))
}

fn reconciler<G: DocumentGenerator>(generator: G, spec: InvoiceSpec) -> Reconciler<MemoryStore, G> {
    let store = MemoryStore::new();
    seed(&store, spec);
    Reconciler::new(
        store,
        generator,
        ControllerConfig::default(),
        tracing::Span::none(),
    )
}

fn seed(store: &MemoryStore, spec: InvoiceSpec) {
    let mut invoice = Invoice::new(NAME, spec);
    invoice.metadata.namespace = Some(NAMESPACE.to_string());
    store.insert(&invoice).unwrap();
}

fn key() -> InvoiceKey {
    InvoiceKey::new(NAMESPACE, NAME)
}

fn stored_invoice(store: &MemoryStore) -> Invoice {
    store.object(NAMESPACE, NAME).unwrap()
}

fn stored_status(store: &MemoryStore) -> InvoiceStatus {
    stored_invoice(store).status.unwrap()
}

fn child_counts(store: &MemoryStore) -> [usize; 4] {
    [
        store.count::<Secret>(),
        store.count::<Deployment>(),
        store.count::<Service>(),
        store.count::<Ingress>(),
    ]
}

/// Replace the invoice spec the way `kubectl apply` would
async fn edit_spec(store: &MemoryStore, spec: InvoiceSpec) {
    let mut invoice = stored_invoice(store);
    invoice.spec = spec;
    store.update(&invoice).await.unwrap();
}

#[tokio::test]
async fn test_success_without_exposure() {
    let reconciler = reconciler(FixedGenerator(512), without_exposure());

    let action = reconciler.reconcile_key(&key()).await.unwrap();

    assert_eq!(action, Action::await_change());
    let store = reconciler.store();
    assert_eq!(child_counts(store), [1, 1, 1, 0]);

    let secret: Secret = store.object(NAMESPACE, NAME).unwrap();
    assert_eq!(secret.data.unwrap()["pdf"].0.len(), 512);

    let status = stored_status(store);
    assert_eq!(status.phase, InvoicePhase::Success);
    assert_eq!(status.message, "");
    assert_eq!(status.endpoint, "");
    assert_eq!(status.observed_generation, Some(1));
    assert!(status.last_processed_time.is_some());
}

#[tokio::test]
async fn test_malformed_url_applies_everything_but_the_route() {
    let reconciler = reconciler(FixedGenerator(512), with_exposure("https://bad url", false));

    let action = reconciler.reconcile_key(&key()).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(15)));
    let store = reconciler.store();
    assert_eq!(child_counts(store), [1, 1, 1, 0]);

    let status = stored_status(store);
    assert_eq!(status.phase, InvoicePhase::Failure);
    assert!(status.message.contains("publicURL"));
    assert_eq!(status.endpoint, "");
    assert_eq!(status.observed_generation, Some(1));
}

#[tokio::test]
async fn test_generator_error_applies_nothing() {
    let reconciler = reconciler(FailingGenerator, without_exposure());

    let action = reconciler.reconcile_key(&key()).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(15)));
    let store = reconciler.store();
    assert_eq!(child_counts(store), [0, 0, 0, 0]);

    let status = stored_status(store);
    assert_eq!(status.phase, InvoicePhase::Failure);
    assert_eq!(status.message, "invoice items must not be empty");
}

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    let reconciler = reconciler(
        PdfInvoiceGenerator::new(),
        with_exposure("https://invoices.example.com/inv1", true),
    );
    reconciler.reconcile_key(&key()).await.unwrap();

    let store = reconciler.store();
    let writes = store.write_count();
    let secret: Secret = store.object(NAMESPACE, NAME).unwrap();
    let deployment: Deployment = store.object(NAMESPACE, NAME).unwrap();
    let service: Service = store.object(NAMESPACE, NAME).unwrap();
    let ingress: Ingress = store.object(NAMESPACE, NAME).unwrap();
    let status = stored_status(store);

    let action = reconciler.reconcile_key(&key()).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(store.write_count(), writes);
    assert_eq!(store.object::<Secret>(NAMESPACE, NAME).unwrap(), secret);
    assert_eq!(store.object::<Deployment>(NAMESPACE, NAME).unwrap(), deployment);
    assert_eq!(store.object::<Service>(NAMESPACE, NAME).unwrap(), service);
    assert_eq!(store.object::<Ingress>(NAMESPACE, NAME).unwrap(), ingress);
    assert_eq!(stored_status(store), status);
}

#[tokio::test]
async fn test_pdf_document_lands_in_secret() {
    let reconciler = reconciler(PdfInvoiceGenerator::new(), without_exposure());
    reconciler.reconcile_key(&key()).await.unwrap();

    let secret: Secret = reconciler.store().object(NAMESPACE, NAME).unwrap();
    let document = &secret.data.unwrap()["pdf"].0;
    assert!(document.starts_with(b"%PDF-"));
}

#[tokio::test]
async fn test_tls_route_and_endpoint() {
    let reconciler = reconciler(
        FixedGenerator(16),
        with_exposure("https://invoices.example.com//inv1/", true),
    );

    let action = reconciler.reconcile_key(&key()).await.unwrap();

    assert_eq!(action, Action::await_change());
    let store = reconciler.store();
    assert_eq!(child_counts(store), [1, 1, 1, 1]);

    let ingress: Ingress = store.object(NAMESPACE, NAME).unwrap();
    let spec = ingress.spec.unwrap();
    assert_eq!(
        spec.tls.unwrap()[0].secret_name.as_deref(),
        Some("invoices.example.com-tls")
    );
    let rule = &spec.rules.unwrap()[0];
    assert_eq!(
        rule.http.as_ref().unwrap().paths[0].path.as_deref(),
        Some("/inv1")
    );

    assert_eq!(
        stored_status(store).endpoint,
        "https://invoices.example.com/inv1"
    );
}

#[tokio::test]
async fn test_observed_generation_follows_spec_edits() {
    let reconciler = reconciler(FixedGenerator(16), without_exposure());
    let store = reconciler.store();
    reconciler.reconcile_key(&key()).await.unwrap();
    assert_eq!(stored_status(store).observed_generation, Some(1));

    // A broken edit is observed as a failure of generation 2
    edit_spec(store, with_exposure("", false)).await;
    assert_eq!(stored_invoice(store).metadata.generation, Some(2));
    let action = reconciler.reconcile_key(&key()).await.unwrap();
    assert_eq!(action, Action::requeue(Duration::from_secs(15)));
    let status = stored_status(store);
    assert_eq!(status.phase, InvoicePhase::Failure);
    assert_eq!(status.observed_generation, Some(2));

    // Fixing it recovers and reports the endpoint
    edit_spec(store, with_exposure("http://invoices.example.com/inv1", false)).await;
    let action = reconciler.reconcile_key(&key()).await.unwrap();
    assert_eq!(action, Action::await_change());
    let status = stored_status(store);
    assert_eq!(status.phase, InvoicePhase::Success);
    assert_eq!(status.message, "");
    assert_eq!(status.endpoint, "http://invoices.example.com/inv1");
    assert_eq!(status.observed_generation, Some(3));
}

#[tokio::test]
async fn test_apply_failure_short_circuits() {
    let reconciler = reconciler(FixedGenerator(16), without_exposure());
    let store = reconciler.store();
    store.fail_writes_for("Deployment", "admission webhook denied the request");

    let action = reconciler.reconcile_key(&key()).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(15)));
    assert_eq!(child_counts(store), [1, 0, 0, 0]);
    let status = stored_status(store);
    assert_eq!(status.phase, InvoicePhase::Failure);
    assert!(status.message.contains("Deployment"));
    assert!(status.message.contains("admission webhook denied the request"));

    // The next pass after the outage converges
    store.clear_failures();
    let action = reconciler.reconcile_key(&key()).await.unwrap();
    assert_eq!(action, Action::await_change());
    assert_eq!(child_counts(store), [1, 1, 1, 0]);
    assert_eq!(stored_status(store).phase, InvoicePhase::Success);
}

#[tokio::test]
async fn test_status_write_failure_requeues() {
    let reconciler = reconciler(FixedGenerator(16), without_exposure());
    let store = reconciler.store();
    store.fail_status_writes("apiserver unavailable");

    let action = reconciler.reconcile_key(&key()).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(15)));
    assert!(stored_invoice(store).status.is_none());
}

#[tokio::test]
async fn test_missing_invoice_is_ignored() {
    let reconciler = reconciler(FixedGenerator(16), without_exposure());

    let action = reconciler
        .reconcile_key(&InvoiceKey::new(NAMESPACE, "deleted"))
        .await
        .unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(child_counts(reconciler.store()), [0, 0, 0, 0]);
}

#[tokio::test]
async fn test_slow_pass_times_out() {
    let store = SlowStore {
        inner: MemoryStore::new(),
        delay: Duration::from_secs(30),
    };
    seed(&store.inner, without_exposure());
    let config = ControllerConfig {
        reconcile_timeout_secs: 1,
        ..ControllerConfig::default()
    };
    let reconciler = Reconciler::new(store, FixedGenerator(16), config, tracing::Span::none());

    let action = reconciler.reconcile_key(&key()).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(15)));
    let status = stored_status(&reconciler.store().inner);
    assert_eq!(status.phase, InvoicePhase::Failure);
    assert!(status.message.contains("did not finish"));
}

#[tokio::test]
async fn test_update_conflict_fails_the_pass_and_requeues() {
    let store = RacingStore {
        inner: MemoryStore::new(),
    };
    seed(&store.inner, without_exposure());
    let reconciler = Reconciler::new(
        store,
        FixedGenerator(16),
        ControllerConfig::default(),
        tracing::Span::none(),
    );
    reconciler.reconcile_key(&key()).await.unwrap();
    assert_eq!(stored_status(&reconciler.store().inner).phase, InvoicePhase::Success);

    let mut edited = without_exposure();
    edited.deployment = Some(WorkloadConfig {
        image: Some("viewer:2".to_string()),
        ..WorkloadConfig::default()
    });
    edit_spec(&reconciler.store().inner, edited).await;

    let action = reconciler.reconcile_key(&key()).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(15)));
    let status = stored_status(&reconciler.store().inner);
    assert_eq!(status.phase, InvoicePhase::Failure);
    assert!(status.message.contains("failed to update Workload (Deployment)"));
    assert!(status.message.contains("conflicting write"));
    assert_eq!(status.observed_generation, Some(2));
}

#[tokio::test]
async fn test_removed_route_annotation_is_converged() {
    let annotated = spec(json!({
        "publicURL": "https://invoices.example.com/inv1",
        "ingress": {
            "enabled": true,
            "annotations": { "cert-manager.io/cluster-issuer": "letsencrypt" }
        }
    }));
    let reconciler = reconciler(FixedGenerator(16), annotated);
    reconciler.reconcile_key(&key()).await.unwrap();
    let store = reconciler.store();
    let ingress: Ingress = store.object(NAMESPACE, NAME).unwrap();
    assert!(ingress.metadata.annotations.unwrap().contains_key("cert-manager.io/cluster-issuer"));

    edit_spec(store, with_exposure("https://invoices.example.com/inv1", false)).await;
    reconciler.reconcile_key(&key()).await.unwrap();

    let ingress: Ingress = store.object(NAMESPACE, NAME).unwrap();
    assert!(!ingress.metadata.annotations.unwrap().contains_key("cert-manager.io/cluster-issuer"));
    assert_eq!(stored_status(store).phase, InvoicePhase::Success);
}
