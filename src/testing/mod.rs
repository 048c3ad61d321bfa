//! Testing utilities for users of the library.
//!
//! - [`StubTask`]: a task that returns a configured outcome
//! - [`FlakyTask`]: a task that fails N times then succeeds
//! - [`RecordingHandler`]: an event handler that captures emitted events

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;

use crate::core::interval::Interval;
use crate::core::outcome::Outcome;
use crate::core::task::{Task, TaskError};
use crate::events::{Event, EventHandler};
use crate::runner::Runner;

/// A task that returns a pre-configured outcome and counts its calls.
pub struct StubTask {
    name: String,
    interval: Interval,
    outcome: Outcome,
    calls: AtomicU32,
}

impl StubTask {
    /// A stub that succeeds.
    pub fn new(name: impl Into<String>, interval: Interval) -> Arc<Self> {
        Self::with_outcome(name, interval, Outcome::success())
    }

    /// A stub that returns the given outcome.
    pub fn with_outcome(
        name: impl Into<String>,
        interval: Interval,
        outcome: Outcome,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            interval,
            outcome,
            calls: AtomicU32::new(0),
        })
    }

    /// How many times the task has been started.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Task for StubTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Interval {
        self.interval.clone()
    }

    async fn start(&self, _runner: &Runner) -> Result<Outcome, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.outcome.clone())
    }
}

/// A task that fails a configurable number of times before succeeding.
///
/// Useful for exercising failure recording and re-run behavior.
pub struct FlakyTask {
    name: String,
    interval: Interval,
    failures_remaining: AtomicU32,
    calls: AtomicU32,
}

impl FlakyTask {
    /// Create a task that fails `fail_count` times then succeeds.
    pub fn new(name: impl Into<String>, interval: Interval, fail_count: u32) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            interval,
            failures_remaining: AtomicU32::new(fail_count),
            calls: AtomicU32::new(0),
        })
    }

    /// How many times the task has been started.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Task for FlakyTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Interval {
        self.interval.clone()
    }

    async fn start(&self, _runner: &Runner) -> Result<Outcome, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            Err(TaskError::ExecutionFailed(
                "intentional test failure".to_string(),
            ))
        } else {
            Ok(Outcome::success())
        }
    }
}

/// Event handler that records every event it receives.
pub struct RecordingHandler {
    events: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    /// Create a new recording handler.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    /// The events received so far.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}
