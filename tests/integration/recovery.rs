//! Crash-recovery integration tests.
//!
//! A process killed mid-task leaves a `Progress` record behind. These tests
//! verify that such records are reclaimed once they exceed the running-time
//! ceiling, and that the exit guard reclassifies work on graceful shutdown.

use crate::common::{seed_record_line, store_at};
use chrono::Utc;
use minuterie::testing::StubTask;
use minuterie::{Interval, MAX_RUNNING_SECS, Scheduler, StatusCode};
use tempfile::TempDir;

fn now() -> i64 {
    Utc::now().timestamp()
}

#[tokio::test]
async fn test_abandoned_progress_record_is_rerun() {
    let dir = TempDir::new().unwrap();
    let task = StubTask::new("abandoned", Interval::Every(86_400));

    // Simulate a scheduler process that died mid-task over an hour ago.
    seed_record_line(
        dir.path(),
        task.as_ref(),
        now() - MAX_RUNNING_SECS - 60,
        StatusCode::Progress.code(),
    );

    let mut scheduler = Scheduler::new(store_at(dir.path()));
    scheduler.register(task.clone());

    assert!(scheduler.should_run(task.as_ref()));
    assert_eq!(scheduler.run(None).await.unwrap(), 1);
    assert_eq!(task.calls(), 1);

    // The stale Progress record was replaced by a fresh terminal one.
    let record = scheduler.store().record_for(task.as_ref());
    assert_eq!(record.status_code(), StatusCode::Success);
    assert!(record.last_execution_time() >= now() - 5);
}

#[tokio::test]
async fn test_recent_progress_record_is_left_alone() {
    let dir = TempDir::new().unwrap();
    let task = StubTask::new("in-flight", Interval::Every(86_400));

    // Another process started this task ten minutes ago; it is presumed
    // still running.
    seed_record_line(
        dir.path(),
        task.as_ref(),
        now() - 600,
        StatusCode::Progress.code(),
    );

    let mut scheduler = Scheduler::new(store_at(dir.path()));
    scheduler.register(task.clone());

    assert!(!scheduler.should_run(task.as_ref()));
    assert_eq!(scheduler.run(None).await.unwrap(), 0);
    assert_eq!(task.calls(), 0);
}

#[tokio::test]
async fn test_old_failure_is_retried_when_the_window_reopens() {
    let dir = TempDir::new().unwrap();
    let task = StubTask::new("retry-me", Interval::Every(600));

    seed_record_line(
        dir.path(),
        task.as_ref(),
        now() - 700,
        StatusCode::Failure.code(),
    );

    let mut scheduler = Scheduler::new(store_at(dir.path()));
    scheduler.register(task.clone());

    assert_eq!(scheduler.run(None).await.unwrap(), 1);
    assert_eq!(
        scheduler.store().record_for(task.as_ref()).status_code(),
        StatusCode::Success
    );
}

#[tokio::test]
async fn test_exit_guard_is_empty_after_a_clean_run() {
    let dir = TempDir::new().unwrap();
    let task = StubTask::new("clean", Interval::Every(60));

    let mut scheduler = Scheduler::new(store_at(dir.path()));
    scheduler.register(task.clone());
    scheduler.run(None).await.unwrap();

    // Every runner ended, so a shutdown flush has nothing to reclassify.
    assert_eq!(scheduler.exit_guard().pending(), 0);
    assert_eq!(scheduler.exit_guard().flush().await, 0);
}

#[tokio::test]
async fn test_progress_marker_is_durable_before_the_task_finishes() {
    // The in-progress marker is persisted the moment a task starts, so a
    // concurrent or subsequent process can see it. Observe it through the
    // record the task itself sees while running.
    use async_trait::async_trait;
    use minuterie::{Outcome, RecordStore, Runner, Task, TaskError};
    use std::path::PathBuf;
    use std::sync::Arc;

    struct ProbeTask {
        dir: PathBuf,
        observed: std::sync::Mutex<Option<StatusCode>>,
    }

    #[async_trait]
    impl Task for ProbeTask {
        fn name(&self) -> &str {
            "probe"
        }

        fn interval(&self) -> Interval {
            Interval::Every(60)
        }

        async fn start(&self, _runner: &Runner) -> Result<Outcome, TaskError> {
            // A separate store (as another process would use) reads the
            // file while this task is still running.
            let store = RecordStore::new(&self.dir);
            let status = store.record_for(self).status_code();
            *self.observed.lock().unwrap() = Some(status);
            Ok(Outcome::success())
        }
    }

    let dir = TempDir::new().unwrap();
    let task = Arc::new(ProbeTask {
        dir: dir.path().to_path_buf(),
        observed: std::sync::Mutex::new(None),
    });

    let mut scheduler = Scheduler::new(store_at(dir.path()));
    scheduler.register(task.clone());
    scheduler.run(None).await.unwrap();

    assert_eq!(
        task.observed.lock().unwrap().take(),
        Some(StatusCode::Progress)
    );
}
