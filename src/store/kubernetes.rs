//! # Kubernetes Store
//!
//! [`ObjectStore`] backed by the API server.
//!
//! | Subordinate        | Kubernetes object | Name               |
//! |--------------------|-------------------|--------------------|
//! | credential mirror  | `Secret`          | `<name>-credential`|
//! | workload           | `Deployment`      | `<name>`           |
//! | network endpoint   | `Service`         | `<name>`           |
//!
//! Live objects are projected onto the controlled fields only. Updates are
//! JSON merge patches of those fields carrying `metadata.resourceVersion`, so
//! the API server answers a stale write with 409 instead of overwriting.

use super::{ObjectStore, StoreError};
use crate::constants::{
    CREDENTIAL_KEY_PASSWORD, CREDENTIAL_KEY_TOKEN, CREDENTIAL_KEY_URL, CREDENTIAL_KEY_USERNAME,
    FIELD_MANAGER, GITEA_CONTAINER_HTTP_PORT, GITEA_CONTAINER_NAME, GITEA_CONTAINER_SSH_PORT,
    GITEA_KIND, LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_NAME, LABEL_NAME_VALUE,
};
use crate::controller::reconciler::subordinate::{
    CredentialMirrorSpec, NetworkEndpointSpec, OwnerRef, SubordinateKind, SubordinateObject,
    SubordinateSpec, WorkloadSpec,
};
use crate::crd::{Gitea, GiteaStatus, ServiceType};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, HTTPGetAction, PodSpec, PodTemplateSpec,
    Probe, ResourceRequirements, Secret, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Secret keys the credential mirror controls
const CONTROLLED_CREDENTIAL_KEYS: [&str; 4] = [
    CREDENTIAL_KEY_URL,
    CREDENTIAL_KEY_TOKEN,
    CREDENTIAL_KEY_USERNAME,
    CREDENTIAL_KEY_PASSWORD,
];

const DATA_VOLUME: &str = "data";
const DATA_MOUNT_PATH: &str = "/data";
const HEALTH_PATH: &str = "/api/healthz";
const PORT_NAME_HTTP: &str = "http";
const PORT_NAME_SSH: &str = "ssh";

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        }
    }

    fn patch_params() -> PatchParams {
        PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PatchParams::default()
        }
    }
}

/// Map an API error onto the store taxonomy
fn map_kube_error(err: kube::Error, what: &str) -> StoreError {
    match err {
        kube::Error::Api(api_err) => match api_err.code {
            404 => StoreError::NotFound(what.to_string()),
            409 if api_err.reason == "AlreadyExists" => StoreError::AlreadyExists(what.to_string()),
            409 => StoreError::Conflict(format!("{what}: {}", api_err.message)),
            429 | 500..=599 => StoreError::Unavailable(format!("{what}: {}", api_err.message)),
            _ => StoreError::Rejected(format!("{what}: {}", api_err.message)),
        },
        other => StoreError::Unavailable(format!("{what}: {other}")),
    }
}

fn describe(kind: SubordinateKind, namespace: &str, name: &str) -> String {
    format!("{kind} {namespace}/{name}")
}

fn labels(instance: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_MANAGED_BY.to_string(), FIELD_MANAGER.to_string()),
        (LABEL_INSTANCE.to_string(), instance.to_string()),
        (LABEL_NAME.to_string(), LABEL_NAME_VALUE.to_string()),
    ])
}

/// Labels the workload selects its pods by. Immutable once the Deployment exists.
fn selector_labels(instance: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_INSTANCE.to_string(), instance.to_string()),
        (LABEL_NAME.to_string(), LABEL_NAME_VALUE.to_string()),
    ])
}

/// Name of the Gitea resource the object belongs to, from its owner or its own name
fn instance_name(object: &SubordinateObject) -> String {
    object
        .owner
        .as_ref()
        .map_or_else(|| object.name.clone(), |owner| owner.name.clone())
}

fn object_meta(object: &SubordinateObject) -> ObjectMeta {
    ObjectMeta {
        name: Some(object.name.clone()),
        namespace: Some(object.namespace.clone()),
        labels: Some(labels(&instance_name(object))),
        owner_references: object.owner.as_ref().map(|owner| {
            vec![OwnerReference {
                api_version: owner.api_version.clone(),
                kind: owner.kind.clone(),
                name: owner.name.clone(),
                uid: owner.uid.clone(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            }]
        }),
        ..ObjectMeta::default()
    }
}

fn project_owner(meta: &ObjectMeta) -> Option<OwnerRef> {
    let refs = meta.owner_references.as_ref()?;
    refs.iter()
        .find(|r| r.controller == Some(true))
        .or_else(|| refs.iter().find(|r| r.kind == GITEA_KIND))
        .map(|r| OwnerRef {
            api_version: r.api_version.clone(),
            kind: r.kind.clone(),
            name: r.name.clone(),
            uid: r.uid.clone(),
        })
}

fn project(meta: &ObjectMeta, spec: SubordinateSpec) -> SubordinateObject {
    SubordinateObject {
        name: meta.name.clone().unwrap_or_default(),
        namespace: meta.namespace.clone().unwrap_or_default(),
        owner: project_owner(meta),
        spec,
        resource_version: meta.resource_version.clone(),
    }
}

// Credential mirror

fn decode_data(data: Option<&BTreeMap<String, ByteString>>) -> BTreeMap<String, String> {
    data.map(|data| {
        data.iter()
            .filter_map(|(key, value)| {
                String::from_utf8(value.0.clone())
                    .ok()
                    .map(|value| (key.clone(), value))
            })
            .collect()
    })
    .unwrap_or_default()
}

fn project_secret(secret: &Secret) -> SubordinateObject {
    let data = decode_data(secret.data.as_ref())
        .into_iter()
        .filter(|(key, _)| CONTROLLED_CREDENTIAL_KEYS.contains(&key.as_str()))
        .collect();
    project(
        &secret.metadata,
        SubordinateSpec::CredentialMirror(CredentialMirrorSpec { data }),
    )
}

fn encode_data(spec: &CredentialMirrorSpec) -> BTreeMap<String, ByteString> {
    spec.data
        .iter()
        .map(|(key, value)| (key.clone(), ByteString(value.as_bytes().to_vec())))
        .collect()
}

fn build_secret(object: &SubordinateObject, spec: &CredentialMirrorSpec) -> Secret {
    Secret {
        metadata: object_meta(object),
        type_: Some("Opaque".to_string()),
        data: Some(encode_data(spec)),
        ..Secret::default()
    }
}

/// Controlled keys missing from the desired data are removed with `null`
fn secret_patch(object: &SubordinateObject, spec: &CredentialMirrorSpec, version: &str) -> Value {
    let mut data = Map::new();
    for key in CONTROLLED_CREDENTIAL_KEYS {
        let value = spec
            .data
            .get(key)
            .map_or(Value::Null, |value| json!(ByteString(value.as_bytes().to_vec())));
        data.insert(key.to_string(), value);
    }
    json!({
        "metadata": {
            "resourceVersion": version,
            "labels": labels(&instance_name(object)),
        },
        "data": data,
    })
}

// Workload

fn gitea_container(spec: &WorkloadSpec) -> Container {
    let mut ports = vec![ContainerPort {
        name: Some(PORT_NAME_HTTP.to_string()),
        container_port: GITEA_CONTAINER_HTTP_PORT,
        protocol: Some("TCP".to_string()),
        ..ContainerPort::default()
    }];
    if spec.ssh {
        ports.push(ContainerPort {
            name: Some(PORT_NAME_SSH.to_string()),
            container_port: GITEA_CONTAINER_SSH_PORT,
            protocol: Some("TCP".to_string()),
            ..ContainerPort::default()
        });
    }
    let resources = BTreeMap::from([
        ("cpu".to_string(), Quantity(spec.cpu.clone())),
        ("memory".to_string(), Quantity(spec.memory.clone())),
    ]);

    Container {
        name: GITEA_CONTAINER_NAME.to_string(),
        image: Some(spec.image.clone()),
        ports: Some(ports),
        resources: Some(ResourceRequirements {
            limits: Some(resources.clone()),
            requests: Some(resources),
            ..ResourceRequirements::default()
        }),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some(HEALTH_PATH.to_string()),
                port: IntOrString::String(PORT_NAME_HTTP.to_string()),
                ..HTTPGetAction::default()
            }),
            ..Probe::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: DATA_MOUNT_PATH.to_string(),
            ..VolumeMount::default()
        }]),
        ..Container::default()
    }
}

fn build_deployment(object: &SubordinateObject, spec: &WorkloadSpec) -> Deployment {
    let instance = instance_name(object);
    Deployment {
        metadata: object_meta(object),
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&instance)),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels(&instance)),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![gitea_container(spec)],
                    volumes: Some(vec![Volume {
                        name: DATA_VOLUME.to_string(),
                        empty_dir: Some(EmptyDirVolumeSource::default()),
                        ..Volume::default()
                    }]),
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

fn project_deployment(deployment: &Deployment) -> SubordinateObject {
    let spec = deployment.spec.as_ref();
    let container = spec
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|pod| pod.containers.iter().find(|c| c.name == GITEA_CONTAINER_NAME));
    let limit = |name: &str| {
        container
            .and_then(|c| c.resources.as_ref())
            .and_then(|r| r.limits.as_ref())
            .and_then(|limits| limits.get(name))
            .map(|q| q.0.clone())
            .unwrap_or_default()
    };

    project(
        &deployment.metadata,
        SubordinateSpec::Workload(WorkloadSpec {
            image: container
                .and_then(|c| c.image.clone())
                .unwrap_or_default(),
            replicas: spec.and_then(|s| s.replicas).unwrap_or(1),
            cpu: limit("cpu"),
            memory: limit("memory"),
            ssh: container
                .and_then(|c| c.ports.as_ref())
                .is_some_and(|ports| {
                    ports
                        .iter()
                        .any(|p| p.name.as_deref() == Some(PORT_NAME_SSH))
                }),
        }),
    )
}

/// The container list of the pod template is controlled as a whole
fn deployment_patch(object: &SubordinateObject, spec: &WorkloadSpec, version: &str) -> Value {
    json!({
        "metadata": {
            "resourceVersion": version,
            "labels": labels(&instance_name(object)),
        },
        "spec": {
            "replicas": spec.replicas,
            "template": {
                "spec": {
                    "containers": [gitea_container(spec)],
                },
            },
        },
    })
}

// Network endpoint

fn service_ports(spec: &NetworkEndpointSpec) -> Vec<ServicePort> {
    let mut ports = vec![ServicePort {
        name: Some(PORT_NAME_HTTP.to_string()),
        port: spec.http_port,
        target_port: Some(IntOrString::String(PORT_NAME_HTTP.to_string())),
        protocol: Some("TCP".to_string()),
        ..ServicePort::default()
    }];
    if let Some(ssh_port) = spec.ssh_port {
        ports.push(ServicePort {
            name: Some(PORT_NAME_SSH.to_string()),
            port: ssh_port,
            target_port: Some(IntOrString::String(PORT_NAME_SSH.to_string())),
            protocol: Some("TCP".to_string()),
            ..ServicePort::default()
        });
    }
    ports
}

fn build_service(object: &SubordinateObject, spec: &NetworkEndpointSpec) -> Service {
    Service {
        metadata: object_meta(object),
        spec: Some(ServiceSpec {
            type_: Some(spec.service_type.as_str().to_string()),
            selector: Some(selector_labels(&instance_name(object))),
            ports: Some(service_ports(spec)),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

fn parse_service_type(value: Option<&str>) -> ServiceType {
    match value {
        Some("NodePort") => ServiceType::NodePort,
        Some("LoadBalancer") => ServiceType::LoadBalancer,
        _ => ServiceType::ClusterIP,
    }
}

fn project_service(service: &Service) -> SubordinateObject {
    let spec = service.spec.as_ref();
    let port = |name: &str| {
        spec.and_then(|s| s.ports.as_ref())
            .and_then(|ports| ports.iter().find(|p| p.name.as_deref() == Some(name)))
            .map(|p| p.port)
    };
    project(
        &service.metadata,
        SubordinateSpec::NetworkEndpoint(NetworkEndpointSpec {
            service_type: parse_service_type(spec.and_then(|s| s.type_.as_deref())),
            http_port: port(PORT_NAME_HTTP).unwrap_or_default(),
            ssh_port: port(PORT_NAME_SSH),
        }),
    )
}

/// The port list is controlled as a whole; allocated node ports are kept by the API server
fn service_patch(object: &SubordinateObject, spec: &NetworkEndpointSpec, version: &str) -> Value {
    json!({
        "metadata": {
            "resourceVersion": version,
            "labels": labels(&instance_name(object)),
        },
        "spec": {
            "type": spec.service_type.as_str(),
            "ports": service_ports(spec),
        },
    })
}

fn owned_selector(owner: &OwnerRef) -> ListParams {
    ListParams::default().labels(&format!(
        "{LABEL_INSTANCE}={},{LABEL_MANAGED_BY}={FIELD_MANAGER}",
        owner.name
    ))
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(
        &self,
        kind: SubordinateKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SubordinateObject>, StoreError> {
        let what = describe(kind, namespace, name);
        let object = match kind {
            SubordinateKind::CredentialMirror => self
                .secrets(namespace)
                .get_opt(name)
                .await
                .map(|o| o.as_ref().map(project_secret)),
            SubordinateKind::Workload => self
                .deployments(namespace)
                .get_opt(name)
                .await
                .map(|o| o.as_ref().map(project_deployment)),
            SubordinateKind::NetworkEndpoint => self
                .services(namespace)
                .get_opt(name)
                .await
                .map(|o| o.as_ref().map(project_service)),
        };
        object.map_err(|e| map_kube_error(e, &what))
    }

    async fn create(&self, object: &SubordinateObject) -> Result<SubordinateObject, StoreError> {
        let what = describe(object.kind(), &object.namespace, &object.name);
        debug!("Creating {}", what);
        let params = Self::post_params();
        let created = match &object.spec {
            SubordinateSpec::CredentialMirror(spec) => self
                .secrets(&object.namespace)
                .create(&params, &build_secret(object, spec))
                .await
                .map(|s| project_secret(&s)),
            SubordinateSpec::Workload(spec) => self
                .deployments(&object.namespace)
                .create(&params, &build_deployment(object, spec))
                .await
                .map(|d| project_deployment(&d)),
            SubordinateSpec::NetworkEndpoint(spec) => self
                .services(&object.namespace)
                .create(&params, &build_service(object, spec))
                .await
                .map(|s| project_service(&s)),
        };
        created.map_err(|e| map_kube_error(e, &what))
    }

    async fn update(
        &self,
        object: &SubordinateObject,
        expected_version: &str,
    ) -> Result<SubordinateObject, StoreError> {
        let what = describe(object.kind(), &object.namespace, &object.name);
        debug!("Patching {} at version {}", what, expected_version);
        let params = Self::patch_params();
        let updated = match &object.spec {
            SubordinateSpec::CredentialMirror(spec) => self
                .secrets(&object.namespace)
                .patch(
                    &object.name,
                    &params,
                    &Patch::Merge(secret_patch(object, spec, expected_version)),
                )
                .await
                .map(|s| project_secret(&s)),
            SubordinateSpec::Workload(spec) => self
                .deployments(&object.namespace)
                .patch(
                    &object.name,
                    &params,
                    &Patch::Merge(deployment_patch(object, spec, expected_version)),
                )
                .await
                .map(|d| project_deployment(&d)),
            SubordinateSpec::NetworkEndpoint(spec) => self
                .services(&object.namespace)
                .patch(
                    &object.name,
                    &params,
                    &Patch::Merge(service_patch(object, spec, expected_version)),
                )
                .await
                .map(|s| project_service(&s)),
        };
        updated.map_err(|e| map_kube_error(e, &what))
    }

    async fn delete(
        &self,
        kind: SubordinateKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        let what = describe(kind, namespace, name);
        debug!("Deleting {}", what);
        let params = DeleteParams::background();
        let result = match kind {
            SubordinateKind::CredentialMirror => {
                self.secrets(namespace).delete(name, &params).await.map(|_| ())
            }
            SubordinateKind::Workload => self
                .deployments(namespace)
                .delete(name, &params)
                .await
                .map(|_| ()),
            SubordinateKind::NetworkEndpoint => {
                self.services(namespace).delete(name, &params).await.map(|_| ())
            }
        };
        match result {
            Ok(()) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
            Err(e) => Err(map_kube_error(e, &what)),
        }
    }

    async fn list(
        &self,
        kind: SubordinateKind,
        namespace: &str,
        owner: &OwnerRef,
    ) -> Result<Vec<SubordinateObject>, StoreError> {
        let what = format!("{kind} list in {namespace}");
        let params = owned_selector(owner);
        let objects = match kind {
            SubordinateKind::CredentialMirror => self
                .secrets(namespace)
                .list(&params)
                .await
                .map(|l| l.items.iter().map(project_secret).collect::<Vec<_>>()),
            SubordinateKind::Workload => self
                .deployments(namespace)
                .list(&params)
                .await
                .map(|l| l.items.iter().map(project_deployment).collect::<Vec<_>>()),
            SubordinateKind::NetworkEndpoint => self
                .services(namespace)
                .list(&params)
                .await
                .map(|l| l.items.iter().map(project_service).collect::<Vec<_>>()),
        }
        .map_err(|e| map_kube_error(e, &what))?;

        Ok(objects
            .into_iter()
            .filter(|o| o.is_owned_by(owner))
            .collect())
    }

    async fn get_secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, StoreError> {
        self.secrets(namespace)
            .get_opt(name)
            .await
            .map(|secret| secret.map(|s| decode_data(s.data.as_ref())))
            .map_err(|e| map_kube_error(e, &format!("secret {namespace}/{name}")))
    }

    async fn write_status(
        &self,
        namespace: &str,
        name: &str,
        status: &GiteaStatus,
    ) -> Result<(), StoreError> {
        let api: Api<Gitea> = Api::namespaced(self.client.clone(), namespace);
        api.patch_status(
            name,
            &Self::patch_params(),
            &Patch::Merge(json!({ "status": status })),
        )
        .await
        .map(|_| ())
        .map_err(|e| map_kube_error(e, &format!("gitea {namespace}/{name} status")))
    }
}
