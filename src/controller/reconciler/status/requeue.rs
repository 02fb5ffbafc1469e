//! # Requeue
//!
//! When the next attempt should run, and why.

use crate::controller::backoff::ExponentialBackoff;
use std::time::Duration;

/// Intervals and budget the reporter schedules attempts with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequeuePolicy {
    /// Delay after the n-th consecutive retryable failure
    pub backoff: ExponentialBackoff,
    /// Drift-check interval when converged, degraded or waiting on the user
    pub steady_state: Duration,
    /// Consecutive retryable failures before Degraded is raised
    pub retry_budget: u32,
}

/// The engine's request to be invoked again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueDirective {
    /// Rely on watch events only
    None,
    After(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueReason {
    Converged,
    /// Retryable failure within budget
    Backoff,
    /// Retry budget exhausted
    Degraded,
    /// Waiting for a credential fix
    AwaitingUser,
    /// Only a spec edit can help
    InvalidDeclaration,
}

impl RequeueReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RequeueReason::Converged => "converged",
            RequeueReason::Backoff => "backoff",
            RequeueReason::Degraded => "degraded",
            RequeueReason::AwaitingUser => "awaiting_user",
            RequeueReason::InvalidDeclaration => "invalid_declaration",
        }
    }
}
