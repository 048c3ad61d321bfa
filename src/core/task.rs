//! Task trait and error types.
//!
//! The `Task` trait is the fundamental unit of schedulable work. Implement
//! it for a named type, or wrap a closure with [`FnTask`] for ad-hoc tasks.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use super::interval::Interval;
use super::outcome::Outcome;
use super::types::TaskIdentity;
use crate::runner::Runner;

/// Errors that can occur during task execution.
///
/// A task error never reaches the scheduler: the runner catches it and
/// converts it into a `Failure` outcome.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task execution failed with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// External command failed with exit code.
    #[error("command exited with code {0}")]
    CommandFailed(i32),

    /// I/O error while executing.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// The core trait for schedulable tasks.
///
/// # Example
///
/// ```ignore
/// use minuterie::{Interval, Outcome, Runner, Task, TaskError};
/// use async_trait::async_trait;
///
/// struct Cleanup;
///
/// #[async_trait]
/// impl Task for Cleanup {
///     fn name(&self) -> &str {
///         "cleanup"
///     }
///
///     fn interval(&self) -> Interval {
///         Interval::Every(3600)
///     }
///
///     async fn start(&self, _runner: &Runner) -> Result<Outcome, TaskError> {
///         // Do work...
///         Ok(Outcome::success())
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync {
    /// The task's name. Together with [`Task::kind`] it forms the stable
    /// identity under which runs are recorded.
    fn name(&self) -> &str;

    /// The concrete type name of this task.
    ///
    /// Two tasks with the same name but different types have distinct
    /// identities.
    fn kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// How often the task should run. `Interval::Every(0)` disables it.
    fn interval(&self) -> Interval;

    /// Perform the work.
    ///
    /// Must resolve to an [`Outcome`]; an `Err` is caught by the runner and
    /// recorded as a `Failure`.
    async fn start(&self, runner: &Runner) -> Result<Outcome, TaskError>;

    /// The stable identity for this task.
    fn identity(&self) -> TaskIdentity {
        TaskIdentity::compute(self.name(), self.kind())
    }
}

type WorkFuture = Pin<Box<dyn Future<Output = Result<Outcome, TaskError>> + Send>>;

/// An ad-hoc task wrapping a closure.
///
/// The closure's signature, a future resolving to
/// `Result<Outcome, TaskError>`, is the registration-time guarantee that
/// the work produces an outcome; no runtime type check is needed.
pub struct FnTask {
    name: String,
    interval: Interval,
    work: Arc<dyn Fn() -> WorkFuture + Send + Sync>,
}

impl FnTask {
    /// Wrap a closure as a task.
    pub fn new<F, Fut>(name: impl Into<String>, interval: Interval, work: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Outcome, TaskError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            interval,
            work: Arc::new(move || Box::pin(work()) as WorkFuture),
        }
    }
}

#[async_trait]
impl Task for FnTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Interval {
        self.interval.clone()
    }

    async fn start(&self, _runner: &Runner) -> Result<Outcome, TaskError> {
        (self.work)().await
    }
}
