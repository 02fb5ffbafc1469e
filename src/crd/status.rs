//! # Gitea Status
//!
//! Status types for tracking reconciliation state and conditions.
//! The status is rewritten wholesale on every reconciliation attempt.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating mode of a Gitea resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum Mode {
    /// The instance lives outside the cluster and is referenced via a credential
    External,
    /// The operator runs and owns the instance
    Internal,
}

impl Mode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::External => "External",
            Mode::Internal => "Internal",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the Gitea resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GiteaStatus {
    /// Mode as of the last completed reconciliation
    #[serde(default)]
    pub resolved_mode: Option<Mode>,
    /// Generation of the spec last fully reconciled
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Consecutive attempts that ended with a retryable failure.
    /// Drives the retry backoff and the Degraded budget.
    #[serde(default)]
    pub failure_count: u32,
    /// Time of the last attempt that changed this status (RFC3339)
    #[serde(default)]
    pub last_reconcile_time: Option<String>,
}

impl GiteaStatus {
    #[must_use]
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == type_)
    }

    /// True when the named condition exists with status "True"
    #[must_use]
    pub fn is_true(&self, type_: &str) -> bool {
        self.condition(type_).is_some_and(|c| c.status == "True")
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}
