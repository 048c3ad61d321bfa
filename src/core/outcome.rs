//! Task execution outcomes.
//!
//! An [`Outcome`] is the tagged result a task returns from `start`. Each
//! variant maps to one [`StatusCode`] and optionally carries a payload:
//! a message, an error description, or any serializable value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::task::TaskError;
use super::types::StatusCode;

/// Tagged result of a task execution.
///
/// Serializes with serde's externally-tagged encoding; the serialized form
/// is what the record store wraps in base64 on disk, and is treated as an
/// opaque blob for round-trip purposes only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    /// Still queued; not yet executed.
    Queue(Option<Value>),
    /// Completed successfully.
    Success(Option<Value>),
    /// Completed with an error.
    Failure(Option<Value>),
    /// Stopped before completion.
    Stopped(Option<Value>),
    /// Execution in progress.
    Progress(Option<Value>),
    /// Result could not be classified.
    Unknown(Option<Value>),
    /// The process exited mid-execution.
    Exited(Option<Value>),
    /// Skipped without executing.
    Skipped(Option<Value>),
}

impl Outcome {
    /// The status code this outcome maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Outcome::Queue(_) => StatusCode::Queue,
            Outcome::Success(_) => StatusCode::Success,
            Outcome::Failure(_) => StatusCode::Failure,
            Outcome::Stopped(_) => StatusCode::Stopped,
            Outcome::Progress(_) => StatusCode::Progress,
            Outcome::Unknown(_) => StatusCode::Unknown,
            Outcome::Exited(_) => StatusCode::Exited,
            Outcome::Skipped(_) => StatusCode::Skipped,
        }
    }

    /// The optional payload.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Outcome::Queue(p)
            | Outcome::Success(p)
            | Outcome::Failure(p)
            | Outcome::Stopped(p)
            | Outcome::Progress(p)
            | Outcome::Unknown(p)
            | Outcome::Exited(p)
            | Outcome::Skipped(p) => p.as_ref(),
        }
    }

    /// A payload-less outcome for the given status.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::Queue => Outcome::Queue(None),
            StatusCode::Success => Outcome::Success(None),
            StatusCode::Failure => Outcome::Failure(None),
            StatusCode::Stopped => Outcome::Stopped(None),
            StatusCode::Progress => Outcome::Progress(None),
            StatusCode::Unknown => Outcome::Unknown(None),
            StatusCode::Exited => Outcome::Exited(None),
            StatusCode::Skipped => Outcome::Skipped(None),
        }
    }

    /// A plain success.
    pub fn success() -> Self {
        Outcome::Success(None)
    }

    /// A success carrying a payload.
    pub fn success_with<T: Serialize>(payload: T) -> Self {
        Outcome::Success(serde_json::to_value(payload).ok())
    }

    /// A failure carrying a human-readable message.
    pub fn failure(message: impl Into<String>) -> Self {
        Outcome::Failure(Some(Value::String(message.into())))
    }

    /// Convert a task error into a failure outcome.
    pub fn from_error(err: &TaskError) -> Self {
        Outcome::Failure(Some(Value::String(err.to_string())))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.payload() {
            Some(Value::String(s)) => write!(f, "{}: {}", self.status_code(), s),
            Some(other) => write!(f, "{}: {}", self.status_code(), other),
            None => write!(f, "{}", self.status_code()),
        }
    }
}
