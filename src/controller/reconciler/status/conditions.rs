//! Condition list builder.

use crate::crd::Condition;

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";
pub const STATUS_UNKNOWN: &str = "Unknown";

/// Builds a fresh condition list in insertion order.
///
/// `lastTransitionTime` is carried over from the previous list when a
/// condition keeps its status, so it only moves on an actual transition.
pub(crate) struct ConditionSet<'a> {
    previous: &'a [Condition],
    now: &'a str,
    conditions: Vec<Condition>,
}

impl<'a> ConditionSet<'a> {
    pub(crate) fn new(previous: &'a [Condition], now: &'a str) -> Self {
        Self {
            previous,
            now,
            conditions: Vec::new(),
        }
    }

    pub(crate) fn set(
        &mut self,
        type_: &str,
        status: &str,
        reason: &str,
        message: impl Into<String>,
    ) {
        let last_transition_time = self
            .previous
            .iter()
            .find(|c| c.r#type == type_ && c.status == status)
            .and_then(|c| c.last_transition_time.clone())
            .unwrap_or_else(|| self.now.to_string());

        self.conditions.push(Condition {
            r#type: type_.to_string(),
            status: status.to_string(),
            last_transition_time: Some(last_transition_time),
            reason: Some(reason.to_string()),
            message: Some(message.into()),
        });
    }

    /// Copy a condition from the previous list unchanged
    pub(crate) fn keep(&mut self, type_: &str) {
        if let Some(condition) = self.previous.iter().find(|c| c.r#type == type_) {
            self.conditions.push(condition.clone());
        }
    }

    pub(crate) fn finish(self) -> Vec<Condition> {
        self.conditions
    }
}
