//! # Gitea Spec
//!
//! The declared resource. A `Gitea` either references an existing instance
//! through `secretRef` (external mode) or asks the operator to run one
//! (internal mode) using `image`, `sizing` and `exposure`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::status::GiteaStatus;

/// Gitea Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: hyperspike.io/v1
/// kind: Gitea
/// metadata:
///   name: docs
///   namespace: default
/// spec:
///   sizing:
///     preset: small
///   exposure:
///     serviceType: ClusterIP
///     httpPort: 3000
/// ```
///
/// Referencing an instance that lives outside the cluster:
///
/// ```yaml
/// spec:
///   secretRef:
///     name: ext-secret
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Gitea",
    group = "hyperspike.io",
    version = "v1",
    namespaced,
    status = "GiteaStatus",
    shortname = "gitea",
    printcolumn = r#"{"name":"Mode", "type":"string", "jsonPath":".status.resolvedMode"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GiteaSpec {
    /// Reference to a Secret holding connection material for an external Gitea.
    /// When set the operator runs in external mode and ignores every other field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,
    /// Container image for the internal instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Sizing of the internal workload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizing: Option<Sizing>,
    /// Network exposure of the internal instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure: Option<Exposure>,
}

/// Reference to a Secret in the same namespace as the Gitea resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub name: String,
}

/// Named sizing presets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum SizePreset {
    #[default]
    Small,
    Medium,
    Large,
}

/// Workload sizing. Explicit fields override the preset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Sizing {
    #[serde(default)]
    pub preset: SizePreset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// CPU request and limit, as a Kubernetes quantity (e.g. "500m")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    /// Memory request and limit, as a Kubernetes quantity (e.g. "1Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ServiceType {
    #[default]
    ClusterIP,
    NodePort,
    LoadBalancer,
}

impl ServiceType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::ClusterIP => "ClusterIP",
            ServiceType::NodePort => "NodePort",
            ServiceType::LoadBalancer => "LoadBalancer",
        }
    }
}

/// How the internal instance is exposed inside the cluster
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Exposure {
    #[serde(default)]
    pub service_type: ServiceType,
    #[serde(default = "default_http_port")]
    pub http_port: i32,
    /// SSH port for git over ssh. Not exposed when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_port: Option<i32>,
}

impl Default for Exposure {
    fn default() -> Self {
        Self {
            service_type: ServiceType::default(),
            http_port: default_http_port(),
            ssh_port: None,
        }
    }
}

#[must_use]
pub fn default_http_port() -> i32 {
    3000
}
