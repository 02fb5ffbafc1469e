//! # Custom Resource Definitions
//!
//! CRD types for the Gitea operator.
//!
//! ## Module Structure
//!
//! - `spec.rs` - The `Gitea` resource, its spec and default values
//! - `status.rs` - Status types for tracking reconciliation state

mod spec;
mod status;

pub use spec::{
    default_http_port, Exposure, Gitea, GiteaSpec, SecretRef, ServiceType, SizePreset, Sizing,
};
pub use status::{Condition, GiteaStatus, Mode};
