//! # Controller
//!
//! Core controller modules for the Gitea operator.
//!
//! - `backoff`: exponential backoff for retryable failures
//! - `reconciler`: core reconciliation logic
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod reconciler;
pub mod server;
