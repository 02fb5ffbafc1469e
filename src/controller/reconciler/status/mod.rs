//! # Status
//!
//! Status reporting and requeue decisions.

mod conditions;
mod report;
mod requeue;

pub use conditions::{STATUS_FALSE, STATUS_TRUE, STATUS_UNKNOWN};
pub use report::{report, report_invalid, timestamp, AttemptOutcome, Report};
pub use requeue::{RequeueDirective, RequeuePolicy, RequeueReason};
