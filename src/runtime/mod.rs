//! # Runtime
//!
//! Process wiring around the reconciler.
//!
//! - `initialization`: tracing, metrics, HTTP server, client and context setup
//! - `watch_loop`: the kube-runtime controller and its restart loop
//! - `error_policy`: backoff for failed attempts and watch stream errors

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
