//! Viewer Deployment serving the generated document.

use super::{child_metadata, labels, value_or};
use crate::constants::{
    DEFAULT_IMAGE_PULL_POLICY, DEFAULT_WORKLOAD_IMAGE, DEFAULT_WORKLOAD_NAME, DOCUMENT_FILE_NAME,
    DOCUMENT_KEY, DOCUMENT_MOUNT_PATH, TEMPLATE_HASH_ANNOTATION, VIEWER_PORT, VIEWER_PORT_NAME,
};
use crate::crd::Invoice;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, KeyToPath, PodSpec, PodTemplateSpec, SecretVolumeSource,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Environment variable telling the viewer which file to serve
const REQUEST_HASH_ENV: &str = "REQUEST_HASH";

pub(super) fn workload(invoice: &Invoice) -> Deployment {
    let name = invoice.name_any();
    let overrides = invoice.spec.deployment.clone().unwrap_or_default();

    let container_name = value_or(overrides.name.as_ref(), DEFAULT_WORKLOAD_NAME);
    let image = value_or(overrides.image.as_ref(), DEFAULT_WORKLOAD_IMAGE);
    let pull_policy = value_or(overrides.image_pull_policy.as_ref(), DEFAULT_IMAGE_PULL_POLICY);
    let volume_name = format!("{container_name}-volume");

    let container = Container {
        name: container_name.to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some(pull_policy.to_string()),
        env: Some(vec![EnvVar {
            name: REQUEST_HASH_ENV.to_string(),
            value: Some(DOCUMENT_FILE_NAME.to_string()),
            ..EnvVar::default()
        }]),
        ports: Some(vec![ContainerPort {
            name: Some(VIEWER_PORT_NAME.to_string()),
            container_port: VIEWER_PORT,
            protocol: Some("TCP".to_string()),
            ..ContainerPort::default()
        }]),
        volume_mounts: Some(vec![VolumeMount {
            name: volume_name.clone(),
            mount_path: DOCUMENT_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..VolumeMount::default()
        }]),
        ..Container::default()
    };

    let volume = Volume {
        name: volume_name,
        secret: Some(SecretVolumeSource {
            secret_name: Some(name.clone()),
            items: Some(vec![KeyToPath {
                key: DOCUMENT_KEY.to_string(),
                path: DOCUMENT_FILE_NAME.to_string(),
                ..KeyToPath::default()
            }]),
            ..SecretVolumeSource::default()
        }),
        ..Volume::default()
    };

    let template = PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels(&name)),
            ..ObjectMeta::default()
        }),
        spec: Some(PodSpec {
            containers: vec![container],
            volumes: Some(vec![volume]),
            ..PodSpec::default()
        }),
    };

    let mut metadata = child_metadata(invoice);
    metadata.annotations = template_hash(&template)
        .map(|hash| BTreeMap::from([(TEMPLATE_HASH_ANNOTATION.to_string(), hash)]));

    Deployment {
        metadata,
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels(&name)),
                ..LabelSelector::default()
            },
            template,
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

/// SHA-256 of the serialized pod template
pub(crate) fn template_hash(template: &PodTemplateSpec) -> Option<String> {
    let bytes = serde_json::to_vec(template).ok()?;
    Some(format!("{:x}", Sha256::digest(&bytes)))
}
