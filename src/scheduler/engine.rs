//! Scheduler engine implementation.
//!
//! The scheduler owns the task queue, decides once per run-cycle exactly
//! which tasks are due, executes them one after another in a deterministic
//! order, and tracks the queued / in-progress / finished / skipped
//! partitions. Execution is cooperative and sequential: there is no
//! intra-process parallelism, and concurrency exists only across processes
//! through the shared record file.

use chrono::Utc;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::core::interval::{Interval, MIN_INTERVAL_SECS};
use crate::core::outcome::Outcome;
use crate::core::task::{FnTask, Task, TaskError};
use crate::core::types::{StatusCode, TaskIdentity};
use crate::events::{Event, EventBus};
use crate::runner::{ExitGuard, Runner};
use crate::store::RecordStore;

/// Oldest timestamp treated as a plausible run time.
///
/// A `Progress` record with a time below this floor is a bogus ancient
/// timestamp, not an abandoned run, and is excluded from the stuck-progress
/// recovery rule.
pub const EPOCH_FLOOR: i64 = 1_464_739_200;

/// Maximum time, in seconds, a run may stay recorded as `Progress` before
/// it is treated as abandoned by a crashed process.
pub const MAX_RUNNING_SECS: i64 = 3600;

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `run()` was called while tasks from a previous call are still in
    /// progress. This indicates a programming error in the host process and
    /// is the one condition that is not absorbed.
    #[error("cannot start a run: {0} task(s) still in progress")]
    RunInProgress(usize),
}

#[derive(Clone)]
struct Partition {
    due: Vec<Arc<dyn Task>>,
    skipped: Vec<Arc<dyn Task>>,
}

/// Owner of the task queue and the run-cycle state machine.
pub struct Scheduler {
    queue: Vec<Arc<dyn Task>>,
    in_progress: Vec<Arc<dyn Task>>,
    finished: Vec<Runner>,
    skipped: Vec<Arc<dyn Task>>,
    store: Arc<RecordStore>,
    bus: Arc<EventBus>,
    exit_guard: Arc<ExitGuard>,
    /// Tasks already found due this cycle; avoids recomputing the due-check.
    cycle_due: Mutex<HashSet<TaskIdentity>>,
    /// Cached due/skip partition, valid until the queue is mutated.
    partition: Mutex<Option<Partition>>,
}

impl Scheduler {
    /// Create a scheduler over the given record store.
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self::with_event_bus(store, EventBus::new())
    }

    /// Create a scheduler with a pre-configured event bus.
    pub fn with_event_bus(store: Arc<RecordStore>, bus: EventBus) -> Self {
        let bus = Arc::new(bus);
        let exit_guard = Arc::new(ExitGuard::new(Arc::clone(&store), Arc::clone(&bus)));
        Self {
            queue: Vec::new(),
            in_progress: Vec::new(),
            finished: Vec::new(),
            skipped: Vec::new(),
            store,
            bus,
            exit_guard,
            cycle_due: Mutex::new(HashSet::new()),
            partition: Mutex::new(None),
        }
    }

    /// The record store backing this scheduler.
    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// The event bus scheduling events are emitted on.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The exit guard tracking mid-flight runners; flush it from the
    /// process shutdown path.
    pub fn exit_guard(&self) -> &Arc<ExitGuard> {
        &self.exit_guard
    }

    /// Add a task to the queue.
    pub fn register(&mut self, task: Arc<dyn Task>) {
        self.queue.push(task);
        self.invalidate_partition();
    }

    /// Register an ad-hoc closure as a task.
    ///
    /// The closure's future must resolve to `Result<Outcome, TaskError>`,
    /// which is the compile-time guarantee that ad-hoc work produces an
    /// outcome.
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, interval: Interval, work: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Outcome, TaskError>> + Send + 'static,
    {
        self.register(Arc::new(FnTask::new(name, interval, work)));
    }

    /// Remove a task from the queue by name. Returns whether anything was
    /// removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.queue.len();
        self.queue.retain(|task| task.name() != name);
        let removed = self.queue.len() != before;
        if removed {
            self.invalidate_partition();
        }
        removed
    }

    /// Tasks waiting in the queue.
    pub fn queued(&self) -> &[Arc<dyn Task>] {
        &self.queue
    }

    /// Tasks currently being processed.
    pub fn in_progress(&self) -> &[Arc<dyn Task>] {
        &self.in_progress
    }

    /// Runners that reached a terminal state, in completion order.
    pub fn finished(&self) -> &[Runner] {
        &self.finished
    }

    /// Drain the finished runners.
    pub fn take_finished(&mut self) -> Vec<Runner> {
        std::mem::take(&mut self.finished)
    }

    /// Tasks the last partition found not due.
    pub fn skipped(&self) -> &[Arc<dyn Task>] {
        &self.skipped
    }

    /// Whether the task is due at the current instant.
    pub fn should_run(&self, task: &dyn Task) -> bool {
        self.should_run_at(task, Utc::now().timestamp())
    }

    /// Whether the task is due at `now` (Unix seconds).
    pub fn should_run_at(&self, task: &dyn Task, now: i64) -> bool {
        let interval = task.interval();
        if interval.is_disabled() {
            return false;
        }

        let identity = task.identity();
        if self.cycle_due().contains(&identity) {
            return true;
        }

        let record = self.store.record_for(task);
        let last = record.last_execution_time();
        let code = record.status_code();

        // A Progress record with a plausible timestamp that exceeded the
        // running-time ceiling is an abandoned run from a crashed process;
        // the task is eligible again.
        if code == StatusCode::Progress && last >= EPOCH_FLOOR && now - last > MAX_RUNNING_SECS {
            self.cycle_due().insert(identity);
            return true;
        }

        let due = match &interval {
            Interval::Every(_) => {
                let secs = interval.clamped_secs().unwrap_or(MIN_INTERVAL_SECS) as i64;
                last + secs <= now || !code.blocks_rerun()
            }
            Interval::Custom(predicate) => predicate.should_run(task, last, code, now),
        };
        if due {
            self.cycle_due().insert(identity);
        }
        due
    }

    /// Partition the queue into a due subset and a skipped subset, both
    /// ordered ascending by last-execution time so long-neglected tasks run
    /// before recently-run ones. Cached until the queue is mutated.
    pub fn queue_processed(&self) -> (Vec<Arc<dyn Task>>, Vec<Arc<dyn Task>>) {
        {
            let cache = self.partition();
            if let Some(partition) = cache.as_ref() {
                return (partition.due.clone(), partition.skipped.clone());
            }
        }

        let mut ordered: Vec<(i64, Arc<dyn Task>)> = self
            .queue
            .iter()
            .map(|task| {
                let last = self.store.record_for(task.as_ref()).last_execution_time();
                (last, Arc::clone(task))
            })
            .collect();
        ordered.sort_by_key(|(last, _)| *last);

        let mut due = Vec::new();
        let mut skipped = Vec::new();
        for (_, task) in ordered {
            if self.should_run(task.as_ref()) {
                due.push(task);
            } else {
                skipped.push(task);
            }
        }

        *self.partition() = Some(Partition {
            due: due.clone(),
            skipped: skipped.clone(),
        });
        (due, skipped)
    }

    /// Execute one run-cycle.
    ///
    /// Processes every due task in partition order, one after another. A
    /// `timeout` bounds how many further tasks are started. It is checked
    /// between tasks, never preempting one that already began; tasks that
    /// did not start are returned to the queue unprocessed.
    ///
    /// Returns the number of tasks actually attempted.
    pub async fn run(&mut self, timeout: Option<Duration>) -> Result<usize, SchedulerError> {
        if !self.in_progress.is_empty() {
            return Err(SchedulerError::RunInProgress(self.in_progress.len()));
        }

        let run_start = Instant::now();
        self.cycle_due().clear();

        let (due, skipped) = self.queue_processed();
        self.skipped = skipped;

        let due_ids: HashSet<TaskIdentity> = due.iter().map(|task| task.identity()).collect();
        self.queue.retain(|task| !due_ids.contains(&task.identity()));
        self.invalidate_partition();
        self.in_progress = due.clone();

        self.bus.emit(Event::run_started(due.len())).await;

        let deadline = timeout.map(|budget| run_start + budget);
        let mut processed = 0usize;

        for task in due {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    tracing::warn!(
                        remaining = self.in_progress.len(),
                        "run budget exhausted, returning remaining tasks to the queue"
                    );
                    break;
                }
            }

            let identity = task.identity();
            let record = self.store.record_for(task.as_ref());
            let mut runner = Runner::new(Arc::clone(&task), record);

            self.bus
                .emit(Event::task_started(task.name(), identity.clone()))
                .await;

            runner.process(&*self).await;

            // Finally-semantics: the record is finished and the runner moves
            // to the finished set no matter how processing went.
            let execution_time = runner
                .execute_time()
                .unwrap_or_else(|| Utc::now().timestamp());
            self.store.finish(execution_time, &mut runner);

            self.bus
                .emit(Event::task_finished(
                    task.name(),
                    identity.clone(),
                    runner.status(),
                    runner.execution_duration(),
                ))
                .await;

            self.in_progress.retain(|t| t.identity() != identity);
            self.finished.push(runner);
            processed += 1;
        }

        // Anything still marked in-progress was never started; put it back.
        if !self.in_progress.is_empty() {
            let leftovers = std::mem::take(&mut self.in_progress);
            self.queue.extend(leftovers);
            self.invalidate_partition();
        }

        self.bus
            .emit(Event::run_completed(processed, run_start.elapsed()))
            .await;

        Ok(processed)
    }

    /// The next instant (Unix seconds) the task becomes due, or `None` for
    /// a disabled task.
    pub fn next_run_date(&self, task: &dyn Task) -> Option<i64> {
        self.next_run_date_at(task, Utc::now().timestamp())
    }

    /// The next due instant evaluated at `now`.
    pub fn next_run_date_at(&self, task: &dyn Task, now: i64) -> Option<i64> {
        let interval = task.interval();
        match &interval {
            Interval::Every(0) => None,
            Interval::Every(_) => {
                let secs = interval.clamped_secs().unwrap_or(MIN_INTERVAL_SECS) as i64;
                let record = self.store.record_for(task);
                let last = record.last_execution_time();
                // Only a fresh record projects from its own run time; a
                // never-run or stale record falls back to counting from now.
                let fresh = last > 0 && now - last <= MAX_RUNNING_SECS;
                if fresh && last + secs > now {
                    Some(last + secs)
                } else {
                    Some(now + secs)
                }
            }
            Interval::Custom(predicate) => {
                let record = self.store.record_for(task);
                Some(predicate.next_due(record.last_execution_time(), now))
            }
        }
    }

    fn cycle_due(&self) -> MutexGuard<'_, HashSet<TaskIdentity>> {
        match self.cycle_due.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn partition(&self) -> MutexGuard<'_, Option<Partition>> {
        match self.partition.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn invalidate_partition(&self) {
        *self.partition() = None;
    }
}
