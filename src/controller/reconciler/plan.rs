//! # Subordinate Set Planner
//!
//! Diffs the subordinates a mode requires against what the store reports and
//! produces an ordered list of single-object operations.
//!
//! Pure: the planner never talks to the store, so it can be tested as a
//! function from snapshot to plan.
//!
//! ## Ordering
//!
//! 1. credential mirror create/update (the workload consumes it)
//! 2. workload create/update
//! 3. workload delete
//! 4. credential mirror delete (after its consumer is gone)
//! 5. network endpoint operations (independent)

use super::credential::Credential;
use super::desired::{DesiredMode, DesiredState};
use super::subordinate::{
    CredentialMirrorSpec, NetworkEndpointSpec, SubordinateKind, SubordinateObject,
    SubordinateSpec, WorkloadSpec,
};
use crate::crd::Mode;
use std::fmt;
use thiserror::Error;

/// Observed input the planner cannot have been given by a correct caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("resolved mode {resolved} does not match the desired state ({desired})")]
    ModeMismatch { resolved: Mode, desired: Mode },
    #[error("observed {kind} {namespace}/{name} does not belong to this Gitea")]
    ForeignObject {
        kind: SubordinateKind,
        namespace: String,
        name: String,
    },
    #[error("observed {kind} {name} has no resource version")]
    MissingResourceVersion { kind: SubordinateKind, name: String },
}

/// Independent sequences of operations. Operations in one chain run in order;
/// chains may run concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Chain {
    /// Credential mirror and the workload that consumes it
    Credential,
    Endpoint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create(SubordinateObject),
    /// Replace the controlled fields, provided the object is still at `expected_version`
    Update {
        object: SubordinateObject,
        expected_version: String,
    },
    Delete {
        kind: SubordinateKind,
        namespace: String,
        name: String,
    },
}

impl Operation {
    #[must_use]
    pub fn kind(&self) -> SubordinateKind {
        match self {
            Operation::Create(object) | Operation::Update { object, .. } => object.kind(),
            Operation::Delete { kind, .. } => *kind,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Operation::Create(object) | Operation::Update { object, .. } => &object.name,
            Operation::Delete { name, .. } => name,
        }
    }

    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Create(_) => "create",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
        }
    }

    #[must_use]
    pub fn is_delete(&self) -> bool {
        matches!(self, Operation::Delete { .. })
    }

    #[must_use]
    pub fn chain(&self) -> Chain {
        match self.kind() {
            SubordinateKind::CredentialMirror | SubordinateKind::Workload => Chain::Credential,
            SubordinateKind::NetworkEndpoint => Chain::Endpoint,
        }
    }

    fn rank(&self) -> u8 {
        match (self.kind(), self.is_delete()) {
            (SubordinateKind::CredentialMirror, false) => 0,
            (SubordinateKind::Workload, false) => 1,
            (SubordinateKind::Workload, true) => 2,
            (SubordinateKind::CredentialMirror, true) => 3,
            (SubordinateKind::NetworkEndpoint, false) => 4,
            (SubordinateKind::NetworkEndpoint, true) => 5,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.verb(), self.kind(), self.name())
    }
}

/// Operations in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedPlan {
    operations: Vec<Operation>,
}

impl OrderedPlan {
    /// Plan with operations already in execution order
    #[cfg(test)]
    pub(crate) fn from_operations(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Split into chains, keeping plan order inside each chain
    #[must_use]
    pub fn into_chains(self) -> Vec<(Chain, Vec<Operation>)> {
        let mut chains: Vec<(Chain, Vec<Operation>)> = Vec::new();
        for operation in self.operations {
            let chain = operation.chain();
            match chains.iter_mut().find(|(c, _)| *c == chain) {
                Some((_, ops)) => ops.push(operation),
                None => chains.push((chain, vec![operation])),
            }
        }
        chains
    }
}

/// Subordinate kinds a mode mandates
#[must_use]
pub fn required_kinds(mode: Mode) -> &'static [SubordinateKind] {
    match mode {
        Mode::External => &[SubordinateKind::CredentialMirror],
        Mode::Internal => &[SubordinateKind::Workload, SubordinateKind::NetworkEndpoint],
    }
}

/// Desired subordinates for `desired`.
///
/// In external mode the mirror can only be computed once the credential is
/// resolved; without it the result is empty.
#[must_use]
pub fn desired_objects(
    desired: &DesiredState,
    credential: Option<&Credential>,
) -> Vec<SubordinateObject> {
    let object = |spec: SubordinateSpec| SubordinateObject {
        name: spec.kind().object_name(&desired.name),
        namespace: desired.namespace.clone(),
        owner: Some(desired.owner_ref()),
        spec,
        resource_version: None,
    };

    match &desired.mode {
        DesiredMode::External { .. } => credential
            .map(|credential| {
                object(SubordinateSpec::CredentialMirror(CredentialMirrorSpec {
                    data: credential.to_data(),
                }))
            })
            .into_iter()
            .collect(),
        DesiredMode::Internal(internal) => vec![
            object(SubordinateSpec::Workload(WorkloadSpec {
                image: internal.image.clone(),
                replicas: internal.sizing.replicas,
                cpu: internal.sizing.cpu.clone(),
                memory: internal.sizing.memory.clone(),
                ssh: internal.exposure.ssh_port.is_some(),
            })),
            object(SubordinateSpec::NetworkEndpoint(NetworkEndpointSpec {
                service_type: internal.exposure.service_type,
                http_port: internal.exposure.http_port,
                ssh_port: internal.exposure.ssh_port,
            })),
        ],
    }
}

/// Compute the operations that move `observed` to the required set of `mode`.
///
/// `observed` must hold only subordinates owned by `desired`, as returned by
/// the store's owner-scoped list.
pub fn plan(
    mode: Mode,
    desired: &DesiredState,
    credential: Option<&Credential>,
    observed: &[SubordinateObject],
) -> Result<OrderedPlan, PlanError> {
    if mode != desired.mode() {
        return Err(PlanError::ModeMismatch {
            resolved: mode,
            desired: desired.mode(),
        });
    }

    let owner = desired.owner_ref();
    if let Some(foreign) = observed
        .iter()
        .find(|o| o.namespace != desired.namespace || !o.is_owned_by(&owner))
    {
        return Err(PlanError::ForeignObject {
            kind: foreign.kind(),
            namespace: foreign.namespace.clone(),
            name: foreign.name.clone(),
        });
    }

    let required = required_kinds(mode);
    let wanted = desired_objects(desired, credential);
    let mut operations = Vec::new();

    for kind in SubordinateKind::ALL {
        let current: Vec<&SubordinateObject> =
            observed.iter().filter(|o| o.kind() == kind).collect();

        if !required.contains(&kind) {
            operations.extend(current.into_iter().map(delete_op));
            continue;
        }

        // Required but not computable yet: leave whatever exists untouched
        let Some(want) = wanted.iter().find(|w| w.kind() == kind) else {
            continue;
        };

        match current.iter().find(|o| o.name == want.name) {
            None => operations.push(Operation::Create(want.clone())),
            Some(existing) if existing.spec != want.spec => {
                let expected_version = existing.resource_version.clone().ok_or_else(|| {
                    PlanError::MissingResourceVersion {
                        kind,
                        name: existing.name.clone(),
                    }
                })?;
                operations.push(Operation::Update {
                    object: want.clone(),
                    expected_version,
                });
            }
            Some(_) => {}
        }

        operations.extend(
            current
                .into_iter()
                .filter(|o| o.name != want.name)
                .map(delete_op),
        );
    }

    operations.sort_by_key(Operation::rank);
    Ok(OrderedPlan { operations })
}

fn delete_op(object: &SubordinateObject) -> Operation {
    Operation::Delete {
        kind: object.kind(),
        namespace: object.namespace.clone(),
        name: object.name.clone(),
    }
}
