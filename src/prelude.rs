//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use gitea_operator::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Reconciler types
pub use crate::controller::reconciler::probe::{ConnectivityProber, GiteaProber, ProbeOutcome};
pub use crate::controller::reconciler::{
    reconcile, reconcile_once, AttemptReport, Reconciler, ReconcilerError, RequeueDirective,
    RequeuePolicy,
};

// Object store
pub use crate::store::{KubeStore, MemoryStore, ObjectStore, StoreError};

pub use crate::config::ControllerConfig;
