//! # Exponential Backoff
//!
//! Provides the retry delay for transient reconciliation failures.
//!
//! The delay is derived from the number of consecutive failures persisted in
//! the resource status, so no backoff state is kept in memory between attempts.
//! Sequence with the defaults: 5s, 10s, 20s, 40s, 80s, 160s, 300s (max).
//!
//! ## Usage
//!
//! ```rust
//! use gitea_operator::controller::backoff::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let backoff = ExponentialBackoff::new(Duration::from_secs(5), Duration::from_secs(300));
//! assert_eq!(backoff.delay_for(1), Duration::from_secs(5));
//! assert_eq!(backoff.delay_for(2), Duration::from_secs(10));
//! assert_eq!(backoff.delay_for(3), Duration::from_secs(20));
//! ```

use std::time::Duration;

/// Exponential backoff calculator
///
/// Each consecutive failure doubles the delay, starting at `initial` and
/// capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay before retrying after the `failures`-th consecutive failure
    ///
    /// `failures` is 1-based; 0 is treated as 1.
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.initial
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }
}
