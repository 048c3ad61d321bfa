//! Lifecycle events and event handling.
//!
//! The scheduler emits events around every run-cycle and every task
//! execution. Events are fire-and-forget observability hooks: no listener
//! return value influences scheduling, and correctness never depends on a
//! handler being registered.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::types::{StatusCode, TaskIdentity};

/// Lifecycle events emitted during scheduling.
#[derive(Debug, Clone)]
pub enum Event {
    /// A run-cycle is about to process its due tasks.
    RunStarted {
        due: usize,
        timestamp: Instant,
    },

    /// A run-cycle finished.
    RunCompleted {
        processed: usize,
        duration: Duration,
        timestamp: Instant,
    },

    /// A task is about to be processed.
    TaskStarted {
        name: String,
        identity: TaskIdentity,
        timestamp: Instant,
    },

    /// A task's runner reached a terminal state.
    TaskFinished {
        name: String,
        identity: TaskIdentity,
        status: StatusCode,
        /// Execution duration in seconds, when the task actually ran.
        duration: Option<i64>,
        timestamp: Instant,
    },

    /// The process is exiting while this task is still in flight.
    TaskExiting {
        name: String,
        identity: TaskIdentity,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::RunStarted { timestamp, .. } => *timestamp,
            Event::RunCompleted { timestamp, .. } => *timestamp,
            Event::TaskStarted { timestamp, .. } => *timestamp,
            Event::TaskFinished { timestamp, .. } => *timestamp,
            Event::TaskExiting { timestamp, .. } => *timestamp,
        }
    }

    /// Create a RunStarted event.
    pub fn run_started(due: usize) -> Self {
        Event::RunStarted {
            due,
            timestamp: Instant::now(),
        }
    }

    /// Create a RunCompleted event.
    pub fn run_completed(processed: usize, duration: Duration) -> Self {
        Event::RunCompleted {
            processed,
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskStarted event.
    pub fn task_started(name: impl Into<String>, identity: TaskIdentity) -> Self {
        Event::TaskStarted {
            name: name.into(),
            identity,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskFinished event.
    pub fn task_finished(
        name: impl Into<String>,
        identity: TaskIdentity,
        status: StatusCode,
        duration: Option<i64>,
    ) -> Self {
        Event::TaskFinished {
            name: name.into(),
            identity,
            status,
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskExiting event.
    pub fn task_exiting(name: impl Into<String>, identity: TaskIdentity) -> Self {
        Event::TaskExiting {
            name: name.into(),
            identity,
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
