//! Single-use task runners.
//!
//! A [`Runner`] drives exactly one task through one execution:
//! `Queue → Progress → {Success, Failure, Skipped, Stopped, Exited}`.
//! Terminal states are sticky, and transitions can only be driven by the
//! owning scheduler: `process` and `skip` are crate-private, which is this
//! crate's equivalent of the call-site provenance check in the original
//! design.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::outcome::Outcome;
use crate::core::record::LastRecord;
use crate::core::task::Task;
use crate::core::types::{StatusCode, TaskIdentity};
use crate::events::{Event, EventBus};
use crate::scheduler::Scheduler;
use crate::store::RecordStore;

/// State-machine driver for one (task, run-cycle) pair. Never reused.
pub struct Runner {
    task: Arc<dyn Task>,
    status: StatusCode,
    record: LastRecord,
    execute_time: Option<i64>,
    executed_time: Option<i64>,
    ended: bool,
}

impl Runner {
    pub(crate) fn new(task: Arc<dyn Task>, record: LastRecord) -> Self {
        Self {
            task,
            status: StatusCode::Queue,
            record,
            execute_time: None,
            executed_time: None,
            ended: false,
        }
    }

    /// The task this runner executes.
    pub fn task(&self) -> &Arc<dyn Task> {
        &self.task
    }

    /// Current runner-level status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The record threaded through this runner's transitions.
    pub fn record(&self) -> &LastRecord {
        &self.record
    }

    /// Unix seconds at which the task itself began executing.
    pub fn execute_time(&self) -> Option<i64> {
        self.execute_time
    }

    /// Unix seconds at which the task finished executing.
    pub fn executed_time(&self) -> Option<i64> {
        self.executed_time
    }

    /// Wall-clock duration of the task execution, when it ran to an end.
    pub fn execution_duration(&self) -> Option<i64> {
        match (self.execute_time, self.executed_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Whether the runner entered `Progress` and never reached an end.
    pub fn is_mid_flight(&self) -> bool {
        !self.ended && self.status == StatusCode::Progress
    }

    pub(crate) fn set_record(&mut self, record: LastRecord) {
        self.record = record;
    }

    pub(crate) fn begin_progress(&mut self) {
        self.status = StatusCode::Progress;
    }

    /// Force the terminal `Exited` state; used from the exit path.
    pub(crate) fn mark_exited(&mut self) {
        self.status = StatusCode::Exited;
        self.ended = true;
        self.record = self.record.with_message(Outcome::Exited(None));
    }

    /// Skip without ever entering `Progress`. Only valid from `Queue`;
    /// anything else is a no-op.
    pub(crate) fn skip(&mut self) {
        if self.status != StatusCode::Queue {
            return;
        }
        self.status = StatusCode::Skipped;
        self.ended = true;
    }

    /// Execute the task once. Only valid from `Queue`; anything else is a
    /// no-op.
    pub(crate) async fn process(&mut self, scheduler: &Scheduler) {
        if self.status != StatusCode::Queue {
            return;
        }

        let started = Utc::now().timestamp();
        self.record = self.record.with_last_execution_time(started);

        // The task may have become not-due between enqueue time and now.
        if !scheduler.should_run(self.task.as_ref()) {
            self.skip();
            scheduler.store().skip_progress(self);
            return;
        }

        scheduler.exit_guard().register(self);

        self.begin_progress();
        scheduler.store().start_progress(self);

        self.execute_time = Some(Utc::now().timestamp());
        let task = Arc::clone(&self.task);
        let outcome = match task.start(&*self).await {
            Ok(outcome) => {
                self.status = StatusCode::Success;
                outcome
            }
            Err(err) => {
                tracing::warn!(task = self.task.name(), error = %err, "task execution failed");
                self.status = StatusCode::Failure;
                Outcome::from_error(&err)
            }
        };
        self.executed_time = Some(Utc::now().timestamp());

        self.ended = true;
        scheduler.exit_guard().clear(self.record.identity());
        self.record = self.record.with_message(outcome);
    }
}

struct InFlight {
    name: String,
    record: LastRecord,
}

/// Registry of mid-flight runners, flushed from the process-exit path.
///
/// Rust cannot run code after a hard kill, so the guard covers the graceful
/// half of the crash story: a shutdown signal flushes every registered
/// snapshot as `Exited`. A hard-killed process instead leaves a `Progress`
/// record that the scheduler's stuck-progress recovery rule reclaims on the
/// next invocation.
pub struct ExitGuard {
    store: Arc<RecordStore>,
    bus: Arc<EventBus>,
    inflight: Mutex<HashMap<TaskIdentity, InFlight>>,
}

impl ExitGuard {
    pub(crate) fn new(store: Arc<RecordStore>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    fn inflight(&self) -> MutexGuard<'_, HashMap<TaskIdentity, InFlight>> {
        match self.inflight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn register(&self, runner: &Runner) {
        self.inflight().insert(
            runner.record().identity().clone(),
            InFlight {
                name: runner.task().name().to_string(),
                record: runner.record().clone(),
            },
        );
    }

    pub(crate) fn clear(&self, identity: &TaskIdentity) {
        self.inflight().remove(identity);
    }

    /// Number of runners currently registered.
    pub fn pending(&self) -> usize {
        self.inflight().len()
    }

    /// Persist every registered snapshot as `Exited` and emit the exiting
    /// event for each. Returns the number of records flushed.
    pub async fn flush(&self) -> usize {
        let drained: Vec<InFlight> = {
            let mut inflight = self.inflight();
            inflight.drain().map(|(_, entry)| entry).collect()
        };

        let count = drained.len();
        for entry in drained {
            tracing::warn!(task = entry.name.as_str(), "marking in-flight task as exited");
            self.bus
                .emit(Event::task_exiting(
                    entry.name.clone(),
                    entry.record.identity().clone(),
                ))
                .await;
            self.store.store_exit_record(&entry.record);
        }
        count
    }
}
