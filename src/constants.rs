//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent the defaults and can be overridden via
//! environment variables where `ControllerConfig` exposes them.

/// Field manager / managed-by value written on every subordinate object
pub const FIELD_MANAGER: &str = "gitea-operator";

/// API version of the Gitea resource, used in owner references
pub const GITEA_API_VERSION: &str = "hyperspike.io/v1";

/// Kind of the Gitea resource, used in owner references
pub const GITEA_KIND: &str = "Gitea";

/// Label keys carried by every subordinate object
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_NAME_VALUE: &str = "gitea";

/// Suffix of the credential mirror Secret name
pub const CREDENTIAL_MIRROR_SUFFIX: &str = "credential";

/// Name of the Gitea container inside the workload
pub const GITEA_CONTAINER_NAME: &str = "gitea";

/// Port Gitea listens on inside the container
pub const GITEA_CONTAINER_HTTP_PORT: i32 = 3000;

/// Port the rootful image runs its SSH server on
pub const GITEA_CONTAINER_SSH_PORT: i32 = 22;

/// Default Gitea image for internal mode
pub const DEFAULT_GITEA_IMAGE: &str = "gitea/gitea:1.22";

/// Keys recognised in a credential Secret
pub const CREDENTIAL_KEY_URL: &str = "url";
pub const CREDENTIAL_KEY_TOKEN: &str = "token";
pub const CREDENTIAL_KEY_USERNAME: &str = "username";
pub const CREDENTIAL_KEY_PASSWORD: &str = "password";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// First retry delay after a transient failure (seconds)
pub const DEFAULT_RETRY_INITIAL_SECS: u64 = 5;

/// Upper bound of the transient retry delay (seconds)
pub const DEFAULT_RETRY_MAX_SECS: u64 = 300;

/// Drift-check interval once converged or terminally degraded (seconds)
pub const DEFAULT_STEADY_STATE_REQUEUE_SECS: u64 = 600;

/// Consecutive retryable failures tolerated before surfacing Degraded
pub const DEFAULT_RETRY_BUDGET: u32 = 10;

/// Timeout of a single connectivity probe (seconds)
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

/// Deadline of a whole reconciliation attempt (seconds)
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 60;

/// Delay before restarting the watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Condition types
pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_CREDENTIAL_RESOLVED: &str = "CredentialResolved";
pub const CONDITION_SUBORDINATES_SYNCED: &str = "SubordinatesSynced";
pub const CONDITION_ENDPOINT_REACHABLE: &str = "EndpointReachable";
pub const CONDITION_DEGRADED: &str = "Degraded";
