//! Core identifier and status types for the scheduler.
//!
//! `StatusCode` discriminants are written to the on-disk record file and
//! shared across process invocations; they are part of the storage format.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

/// Status of a task execution, in memory and on disk.
///
/// The numeric discriminants are stable storage values and must never be
/// renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StatusCode {
    /// Waiting in the queue; the initial state.
    Queue = 0,
    /// Finished successfully.
    Success = 1,
    /// Finished with an error.
    Failure = 2,
    /// Stopped before completion.
    Stopped = 3,
    /// Currently executing.
    Progress = 4,
    /// Fallback label for unrecognized codes; never a transition target.
    Unknown = 5,
    /// The process exited while the task was still executing.
    Exited = 6,
    /// Skipped without executing.
    Skipped = 7,
}

impl StatusCode {
    /// Map a raw storage code back to a status. Unrecognized codes become
    /// [`StatusCode::Unknown`].
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => StatusCode::Queue,
            1 => StatusCode::Success,
            2 => StatusCode::Failure,
            3 => StatusCode::Stopped,
            4 => StatusCode::Progress,
            5 => StatusCode::Unknown,
            6 => StatusCode::Exited,
            7 => StatusCode::Skipped,
            _ => StatusCode::Unknown,
        }
    }

    /// The raw storage code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether this status ends a runner's life.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StatusCode::Success
                | StatusCode::Failure
                | StatusCode::Stopped
                | StatusCode::Exited
                | StatusCode::Skipped
        )
    }

    /// Whether a previous run with this status suppresses an age-independent
    /// re-run in the interval due-check.
    ///
    /// A prior `Skipped`, `Stopped` or `Unknown` result does not block an
    /// immediate re-run; the others gate purely on elapsed time.
    pub fn blocks_rerun(self) -> bool {
        matches!(
            self,
            StatusCode::Progress | StatusCode::Success | StatusCode::Exited | StatusCode::Failure
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Queue => "queue",
            StatusCode::Success => "success",
            StatusCode::Failure => "failure",
            StatusCode::Stopped => "stopped",
            StatusCode::Progress => "progress",
            StatusCode::Unknown => "unknown",
            StatusCode::Exited => "exited",
            StatusCode::Skipped => "skipped",
        };
        write!(f, "{}", name)
    }
}

/// Stable identity of a task: the lowercase-hex SHA-1 of its name combined
/// with its concrete type name.
///
/// The identity is the record-file key, so the same task keeps its history
/// across process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskIdentity(String);

/// Length of the hex digest that forms an identity.
pub const IDENTITY_LEN: usize = 40;

impl TaskIdentity {
    /// Compute the identity for a task name and concrete type name.
    pub fn compute(name: &str, kind: &str) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(name.as_bytes());
        hasher.update(kind.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Parse an identity from its storage form.
    ///
    /// Returns `None` unless the input is exactly 40 lowercase hex
    /// characters.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != IDENTITY_LEN {
            return None;
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return None;
        }
        Some(Self(s.to_string()))
    }

    /// Get the underlying hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
