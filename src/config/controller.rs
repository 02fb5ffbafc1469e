//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_ATTEMPT_TIMEOUT_SECS, DEFAULT_GITEA_IMAGE, DEFAULT_METRICS_PORT,
    DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_RETRY_BUDGET, DEFAULT_RETRY_INITIAL_SECS,
    DEFAULT_RETRY_MAX_SECS, DEFAULT_STEADY_STATE_REQUEUE_SECS, DEFAULT_WATCH_RESTART_DELAY_SECS,
};
use crate::controller::backoff::ExponentialBackoff;
use crate::controller::reconciler::RequeuePolicy;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// HTTP port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// First retry delay after a transient failure (seconds)
    pub retry_initial_secs: u64,
    /// Cap of the exponential retry delay (seconds)
    pub retry_max_secs: u64,
    /// Drift-check requeue interval when converged or degraded (seconds)
    pub steady_state_requeue_secs: u64,
    /// Consecutive retryable failures before the resource is marked Degraded
    pub retry_budget: u32,
    /// Timeout of one connectivity probe against an external Gitea (seconds)
    pub probe_timeout_secs: u64,
    /// Deadline of a whole reconciliation attempt (seconds)
    pub attempt_timeout_secs: u64,
    /// Delay before restarting the watch stream after it ends (seconds)
    pub watch_restart_delay_secs: u64,
    /// Image used for internal instances that do not set `spec.image`
    pub default_image: String,
    /// Namespace to watch. Empty watches all namespaces.
    pub watch_namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            retry_initial_secs: DEFAULT_RETRY_INITIAL_SECS,
            retry_max_secs: DEFAULT_RETRY_MAX_SECS,
            steady_state_requeue_secs: DEFAULT_STEADY_STATE_REQUEUE_SECS,
            retry_budget: DEFAULT_RETRY_BUDGET,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            default_image: DEFAULT_GITEA_IMAGE.to_string(),
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            retry_initial_secs: env_var_or_default(
                "RETRY_INITIAL_SECS",
                DEFAULT_RETRY_INITIAL_SECS,
            ),
            retry_max_secs: env_var_or_default("RETRY_MAX_SECS", DEFAULT_RETRY_MAX_SECS),
            steady_state_requeue_secs: env_var_or_default(
                "STEADY_STATE_REQUEUE_SECS",
                DEFAULT_STEADY_STATE_REQUEUE_SECS,
            ),
            retry_budget: env_var_or_default("RETRY_BUDGET", DEFAULT_RETRY_BUDGET),
            probe_timeout_secs: env_var_or_default(
                "PROBE_TIMEOUT_SECS",
                DEFAULT_PROBE_TIMEOUT_SECS,
            ),
            attempt_timeout_secs: env_var_or_default(
                "ATTEMPT_TIMEOUT_SECS",
                DEFAULT_ATTEMPT_TIMEOUT_SECS,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            default_image: env_var_or_default_str("DEFAULT_GITEA_IMAGE", DEFAULT_GITEA_IMAGE),
            watch_namespace: std::env::var("WATCH_NAMESPACE")
                .ok()
                .filter(|ns| !ns.trim().is_empty()),
        }
    }

    /// Requeue policy handed to the status reporter
    #[must_use]
    pub fn requeue_policy(&self) -> RequeuePolicy {
        RequeuePolicy {
            backoff: ExponentialBackoff::new(
                Duration::from_secs(self.retry_initial_secs),
                Duration::from_secs(self.retry_max_secs),
            ),
            steady_state: Duration::from_secs(self.steady_state_requeue_secs),
            retry_budget: self.retry_budget,
        }
    }

    /// Get probe timeout duration
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Get attempt deadline duration
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
