//! Immutable last-run records.

use serde::{Deserialize, Serialize};

use super::outcome::Outcome;
use super::types::{StatusCode, TaskIdentity};

/// Snapshot of a task's most recent execution.
///
/// Records are immutable; every mutator returns a new value, so a record
/// can be shared freely between the scheduler, runners and the store
/// without coordination. Records are keyed, and reattached at load time,
/// by the task identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastRecord {
    identity: TaskIdentity,
    last_execution_time: i64,
    status_code: StatusCode,
    message: Option<Outcome>,
}

impl LastRecord {
    /// A record for a task that has never run: execution time 0, queued,
    /// no message.
    pub fn fresh(identity: TaskIdentity) -> Self {
        Self {
            identity,
            last_execution_time: 0,
            status_code: StatusCode::Queue,
            message: None,
        }
    }

    /// Build a record from its stored fields.
    ///
    /// The explicit `status_code` wins over the message's own code until the
    /// next [`LastRecord::with_message`].
    pub fn new(
        identity: TaskIdentity,
        last_execution_time: i64,
        status_code: StatusCode,
        message: Option<Outcome>,
    ) -> Self {
        Self {
            identity,
            last_execution_time,
            status_code,
            message,
        }
    }

    /// The identity of the task this record belongs to.
    pub fn identity(&self) -> &TaskIdentity {
        &self.identity
    }

    /// Unix seconds of the last execution; 0 if never run.
    pub fn last_execution_time(&self) -> i64 {
        self.last_execution_time
    }

    /// The recorded status.
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    /// The recorded outcome, if any.
    pub fn message(&self) -> Option<&Outcome> {
        self.message.as_ref()
    }

    /// A copy with the given message attached; the status code mirrors the
    /// message.
    pub fn with_message(&self, message: Outcome) -> Self {
        Self {
            identity: self.identity.clone(),
            last_execution_time: self.last_execution_time,
            status_code: message.status_code(),
            message: Some(message),
        }
    }

    /// A copy with an explicit status override.
    pub fn with_status_code(&self, status_code: StatusCode) -> Self {
        Self {
            identity: self.identity.clone(),
            last_execution_time: self.last_execution_time,
            status_code,
            message: self.message.clone(),
        }
    }

    /// A copy with a new last-execution time.
    pub fn with_last_execution_time(&self, last_execution_time: i64) -> Self {
        Self {
            identity: self.identity.clone(),
            last_execution_time,
            status_code: self.status_code,
            message: self.message.clone(),
        }
    }
}
