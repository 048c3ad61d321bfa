//! Execution intervals and custom due-time predicates.

use std::fmt;
use std::sync::Arc;

use super::task::Task;
use super::types::StatusCode;

/// Minimum interval, in seconds, used for due-time arithmetic.
///
/// Configured intervals below this floor are clamped up to it so a
/// mis-configured task cannot busy-loop the scheduler.
pub const MIN_INTERVAL_SECS: u64 = 60;

/// A custom due-time predicate.
///
/// Implement this to schedule a task on anything other than a fixed number
/// of seconds, such as calendar rules or status-dependent backoff.
pub trait DuePredicate: Send + Sync {
    /// Whether the task should run at `now`, given its last recorded run
    /// time and status.
    fn should_run(&self, task: &dyn Task, last_run: i64, last_status: StatusCode, now: i64)
    -> bool;

    /// The next instant (Unix seconds) at which the task becomes due.
    fn next_due(&self, last_run: i64, now: i64) -> i64;
}

/// How often a task runs.
#[derive(Clone)]
pub enum Interval {
    /// A fixed number of seconds between runs. Zero means "never run".
    Every(u64),
    /// A custom predicate that fully owns the due decision.
    Custom(Arc<dyn DuePredicate>),
}

impl Interval {
    /// Whether this interval permanently disables the task.
    pub fn is_disabled(&self) -> bool {
        matches!(self, Interval::Every(0))
    }

    /// The configured seconds clamped up to [`MIN_INTERVAL_SECS`].
    ///
    /// Returns `None` for disabled and custom intervals, where the clamp
    /// does not apply.
    pub fn clamped_secs(&self) -> Option<u64> {
        match self {
            Interval::Every(0) => None,
            Interval::Every(secs) => Some((*secs).max(MIN_INTERVAL_SECS)),
            Interval::Custom(_) => None,
        }
    }
}

impl fmt::Debug for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Every(secs) => f.debug_tuple("Every").field(secs).finish(),
            Interval::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
