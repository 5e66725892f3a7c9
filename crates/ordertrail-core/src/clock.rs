//! Clock abstraction for deterministic event timestamps.

use chrono::{DateTime, SubsecRound, Utc};

/// Abstraction over system time so that command handling is reproducible.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the current time truncated to whole seconds.
    ///
    /// The event log persists `occurred_at` as epoch seconds, so events are
    /// stamped at that resolution to make a loaded event equal the one that
    /// was appended.
    fn now_seconds(&self) -> DateTime<Utc> {
        self.now().trunc_subsecs(0)
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
