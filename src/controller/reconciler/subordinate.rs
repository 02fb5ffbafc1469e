//! # Subordinate Objects
//!
//! The managed dependents of a Gitea resource, reduced to the fields the
//! operator controls. Store adapters project live objects onto these types,
//! so anything another actor sets (cluster IPs, node ports, extra Secret keys,
//! injected annotations) never takes part in a comparison.

use crate::constants::CREDENTIAL_MIRROR_SUFFIX;
use crate::crd::ServiceType;
use std::collections::BTreeMap;
use std::fmt;

/// The kinds of subordinate objects a Gitea resource can own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubordinateKind {
    /// Copy of the external connection credential (a Secret)
    CredentialMirror,
    /// The Gitea workload (a Deployment)
    Workload,
    /// The in-cluster network endpoint (a Service)
    NetworkEndpoint,
}

impl SubordinateKind {
    pub const ALL: [SubordinateKind; 3] = [
        SubordinateKind::CredentialMirror,
        SubordinateKind::Workload,
        SubordinateKind::NetworkEndpoint,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SubordinateKind::CredentialMirror => "credential-mirror",
            SubordinateKind::Workload => "workload",
            SubordinateKind::NetworkEndpoint => "network-endpoint",
        }
    }

    /// Deterministic object name for this kind under the given Gitea resource
    #[must_use]
    pub fn object_name(&self, instance: &str) -> String {
        match self {
            SubordinateKind::CredentialMirror => format!("{instance}-{CREDENTIAL_MIRROR_SUFFIX}"),
            SubordinateKind::Workload | SubordinateKind::NetworkEndpoint => instance.to_string(),
        }
    }
}

impl fmt::Display for SubordinateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Back-reference from a subordinate to the Gitea resource.
///
/// Recorded on the object for the cluster garbage collector; the operator
/// itself only uses it to recognise its own objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
}

/// Controlled fields of the credential mirror
#[derive(Clone, PartialEq, Eq, Default)]
pub struct CredentialMirrorSpec {
    pub data: BTreeMap<String, String>,
}

impl fmt::Debug for CredentialMirrorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialMirrorSpec")
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Controlled fields of the workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub image: String,
    pub replicas: i32,
    pub cpu: String,
    pub memory: String,
    /// Whether the container publishes its SSH port
    pub ssh: bool,
}

/// Controlled fields of the network endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEndpointSpec {
    pub service_type: ServiceType,
    pub http_port: i32,
    pub ssh_port: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubordinateSpec {
    CredentialMirror(CredentialMirrorSpec),
    Workload(WorkloadSpec),
    NetworkEndpoint(NetworkEndpointSpec),
}

impl SubordinateSpec {
    #[must_use]
    pub fn kind(&self) -> SubordinateKind {
        match self {
            SubordinateSpec::CredentialMirror(_) => SubordinateKind::CredentialMirror,
            SubordinateSpec::Workload(_) => SubordinateKind::Workload,
            SubordinateSpec::NetworkEndpoint(_) => SubordinateKind::NetworkEndpoint,
        }
    }
}

/// One managed dependent of a Gitea resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubordinateObject {
    pub name: String,
    pub namespace: String,
    /// Owner as recorded on the object. `None` for objects nobody owns.
    pub owner: Option<OwnerRef>,
    pub spec: SubordinateSpec,
    /// Opaque store version used for optimistic concurrency. Unset on desired objects.
    pub resource_version: Option<String>,
}

impl SubordinateObject {
    #[must_use]
    pub fn kind(&self) -> SubordinateKind {
        self.spec.kind()
    }

    #[must_use]
    pub fn is_owned_by(&self, owner: &OwnerRef) -> bool {
        self.owner.as_ref().is_some_and(|o| o.uid == owner.uid)
    }
}
