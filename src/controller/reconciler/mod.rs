//! # Reconciler
//!
//! Drives one Gitea resource toward its declaration.
//!
//! Pipeline per attempt: `desired` → `mode` → `plan` → `apply` (+ `probe` in
//! external mode) → `status`. Only `apply`, `probe` and the final status write
//! touch the outside world.

pub mod apply;
pub mod credential;
pub mod desired;
pub mod mode;
pub mod plan;
pub mod probe;
mod quantity;
pub mod reconcile;
pub mod status;
pub mod subordinate;
mod types;

pub use reconcile::{reconcile, reconcile_once, AttemptReport};
pub use status::{RequeueDirective, RequeuePolicy, RequeueReason};
pub use types::{Reconciler, ReconcilerError};
