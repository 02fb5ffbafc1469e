//! # Desired-State Extraction
//!
//! Normalises one declared `Gitea` resource into an immutable [`DesiredState`].
//!
//! `secretRef` is the only input that decides the mode. When it is set the
//! sizing and exposure fields are not read at all, so a half-edited spec
//! cannot make an external instance invalid.

use super::quantity::{canonical_cpu, canonical_memory};
use super::subordinate::OwnerRef;
use crate::constants::{GITEA_API_VERSION, GITEA_KIND};
use crate::crd::{Exposure, Gitea, Mode, SizePreset, Sizing};
use thiserror::Error;

/// Reasons a declaration cannot be turned into a desired state.
///
/// Every variant is user-actionable: only a spec edit can fix it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("metadata.{0} is not set")]
    MissingMetadata(&'static str),
    #[error("spec.secretRef.name must not be empty")]
    EmptySecretRef,
    #[error("spec.image must not be empty")]
    EmptyImage,
    #[error("spec.sizing.replicas must be zero or greater, got {0}")]
    InvalidReplicas(i32),
    #[error("spec.exposure.{field} must be between 1 and 65535, got {value}")]
    InvalidPort { field: &'static str, value: i32 },
    #[error("spec.sizing.{field} is not a valid quantity: {value:?}")]
    InvalidQuantity { field: &'static str, value: String },
    #[error("spec.exposure.httpPort and spec.exposure.sshPort must differ, both are {0}")]
    PortCollision(i32),
}

/// Replicas, CPU and memory after applying the preset and overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSizing {
    pub replicas: i32,
    /// Canonical CPU quantity
    pub cpu: String,
    /// Canonical memory quantity
    pub memory: String,
}

impl ResolvedSizing {
    #[must_use]
    pub fn preset(preset: SizePreset) -> Self {
        let (replicas, cpu, memory) = match preset {
            SizePreset::Small => (1, "250m", "512Mi"),
            SizePreset::Medium => (1, "500m", "1Gi"),
            SizePreset::Large => (2, "1", "2Gi"),
        };
        Self {
            replicas,
            cpu: cpu.to_string(),
            memory: memory.to_string(),
        }
    }
}

/// Everything an internal instance needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalSpec {
    pub image: String,
    pub sizing: ResolvedSizing,
    pub exposure: Exposure,
}

/// Mode-specific part of the desired state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesiredMode {
    /// Connect to an existing Gitea through the named Secret
    External { credential_ref: String },
    /// Run Gitea inside the cluster
    Internal(InternalSpec),
}

/// Normalised, immutable view of one declared resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub generation: i64,
    pub mode: DesiredMode,
}

impl DesiredState {
    /// Build the desired state for `gitea`
    ///
    /// `default_image` is used when an internal declaration leaves `image` unset.
    pub fn extract(gitea: &Gitea, default_image: &str) -> Result<Self, ExtractError> {
        let meta = &gitea.metadata;
        let name = meta
            .name
            .clone()
            .ok_or(ExtractError::MissingMetadata("name"))?;
        let namespace = meta
            .namespace
            .clone()
            .ok_or(ExtractError::MissingMetadata("namespace"))?;
        let uid = meta.uid.clone().ok_or(ExtractError::MissingMetadata("uid"))?;
        let generation = meta.generation.unwrap_or_default();

        let mode = match &gitea.spec.secret_ref {
            Some(secret_ref) => {
                let credential_ref = secret_ref.name.trim();
                if credential_ref.is_empty() {
                    return Err(ExtractError::EmptySecretRef);
                }
                DesiredMode::External {
                    credential_ref: credential_ref.to_string(),
                }
            }
            None => DesiredMode::Internal(InternalSpec {
                image: resolve_image(gitea.spec.image.as_deref(), default_image)?,
                sizing: resolve_sizing(gitea.spec.sizing.as_ref())?,
                exposure: resolve_exposure(gitea.spec.exposure.as_ref())?,
            }),
        };

        Ok(Self {
            name,
            namespace,
            uid,
            generation,
            mode,
        })
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        match self.mode {
            DesiredMode::External { .. } => Mode::External,
            DesiredMode::Internal(_) => Mode::Internal,
        }
    }

    #[must_use]
    pub fn credential_ref(&self) -> Option<&str> {
        match &self.mode {
            DesiredMode::External { credential_ref } => Some(credential_ref),
            DesiredMode::Internal(_) => None,
        }
    }

    #[must_use]
    pub fn internal(&self) -> Option<&InternalSpec> {
        match &self.mode {
            DesiredMode::Internal(spec) => Some(spec),
            DesiredMode::External { .. } => None,
        }
    }

    /// Owner reference recorded on every subordinate of this resource
    #[must_use]
    pub fn owner_ref(&self) -> OwnerRef {
        OwnerRef {
            api_version: GITEA_API_VERSION.to_string(),
            kind: GITEA_KIND.to_string(),
            name: self.name.clone(),
            uid: self.uid.clone(),
        }
    }
}

fn resolve_image(image: Option<&str>, default_image: &str) -> Result<String, ExtractError> {
    match image {
        None => Ok(default_image.to_string()),
        Some(image) if image.trim().is_empty() => Err(ExtractError::EmptyImage),
        Some(image) => Ok(image.trim().to_string()),
    }
}

fn resolve_sizing(sizing: Option<&Sizing>) -> Result<ResolvedSizing, ExtractError> {
    let Some(sizing) = sizing else {
        return Ok(ResolvedSizing::preset(SizePreset::default()));
    };
    let mut resolved = ResolvedSizing::preset(sizing.preset);

    if let Some(replicas) = sizing.replicas {
        if replicas < 0 {
            return Err(ExtractError::InvalidReplicas(replicas));
        }
        resolved.replicas = replicas;
    }
    if let Some(cpu) = &sizing.cpu {
        resolved.cpu = canonical_cpu(cpu).ok_or_else(|| ExtractError::InvalidQuantity {
            field: "cpu",
            value: cpu.clone(),
        })?;
    }
    if let Some(memory) = &sizing.memory {
        resolved.memory =
            canonical_memory(memory).ok_or_else(|| ExtractError::InvalidQuantity {
                field: "memory",
                value: memory.clone(),
            })?;
    }
    Ok(resolved)
}

fn resolve_exposure(exposure: Option<&Exposure>) -> Result<Exposure, ExtractError> {
    let exposure = exposure.cloned().unwrap_or_default();
    validate_port("httpPort", exposure.http_port)?;
    if let Some(ssh_port) = exposure.ssh_port {
        validate_port("sshPort", ssh_port)?;
        if ssh_port == exposure.http_port {
            return Err(ExtractError::PortCollision(ssh_port));
        }
    }
    Ok(exposure)
}

fn validate_port(field: &'static str, value: i32) -> Result<(), ExtractError> {
    if (1..=65535).contains(&value) {
        Ok(())
    } else {
        Err(ExtractError::InvalidPort { field, value })
    }
}
