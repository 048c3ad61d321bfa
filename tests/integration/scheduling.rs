//! Due-time and run-cycle integration tests.

use crate::common::{seed_record_line, store_at};
use chrono::Utc;
use minuterie::testing::{RecordingHandler, StubTask};
use minuterie::{
    Event, EventBus, Interval, MIN_INTERVAL_SECS, Scheduler, StatusCode,
};
use std::time::Duration;
use tempfile::TempDir;

fn now() -> i64 {
    Utc::now().timestamp()
}

#[tokio::test]
async fn test_disabled_task_never_leaves_the_queue() {
    let dir = TempDir::new().unwrap();
    let task = StubTask::new("disabled", Interval::Every(0));

    let mut scheduler = Scheduler::new(store_at(dir.path()));
    scheduler.register(task.clone());

    assert!(!scheduler.should_run(task.as_ref()));
    for _ in 0..3 {
        assert_eq!(scheduler.run(None).await.unwrap(), 0);
    }
    assert_eq!(scheduler.queued().len(), 1);
    assert_eq!(task.calls(), 0);
}

#[test]
fn test_due_time_monotonicity() {
    let dir = TempDir::new().unwrap();
    let task = StubTask::new("steady", Interval::Every(600));
    let t = now();
    seed_record_line(dir.path(), task.as_ref(), t, StatusCode::Success.code());

    // Use a fresh scheduler per probe: a true result is memoized for the
    // rest of the cycle and would mask later probes.
    let scheduler = Scheduler::new(store_at(dir.path()));
    assert!(!scheduler.should_run_at(task.as_ref(), t));
    assert!(!scheduler.should_run_at(task.as_ref(), t + 599));
    assert!(scheduler.should_run_at(task.as_ref(), t + 600));

    let scheduler = Scheduler::new(store_at(dir.path()));
    assert!(scheduler.should_run_at(task.as_ref(), t + 601));
}

#[test]
fn test_first_check_with_no_record_is_due() {
    let dir = TempDir::new().unwrap();
    let task = StubTask::new("newborn", Interval::Every(600));

    let scheduler = Scheduler::new(store_at(dir.path()));
    assert!(scheduler.should_run(task.as_ref()));
}

#[test]
fn test_interval_below_minimum_is_clamped() {
    let dir = TempDir::new().unwrap();
    let task = StubTask::new("eager", Interval::Every(1));
    let t = now();
    seed_record_line(dir.path(), task.as_ref(), t, StatusCode::Success.code());

    let scheduler = Scheduler::new(store_at(dir.path()));
    // Next due is computed as if the interval were the 60-second minimum.
    assert_eq!(
        scheduler.next_run_date_at(task.as_ref(), t + 1),
        Some(t + MIN_INTERVAL_SECS as i64)
    );
    assert!(!scheduler.should_run_at(task.as_ref(), t + 1));
    assert!(scheduler.should_run_at(task.as_ref(), t + MIN_INTERVAL_SECS as i64));
}

#[test]
fn test_prior_skipped_status_reopens_the_window() {
    let dir = TempDir::new().unwrap();
    let t = now();

    // Skipped, Stopped and Unknown prior results do not block an immediate
    // re-run even inside the interval window.
    for (name, code) in [
        ("was-skipped", StatusCode::Skipped),
        ("was-stopped", StatusCode::Stopped),
        ("was-unknown", StatusCode::Unknown),
    ] {
        let task = StubTask::new(name, Interval::Every(86_400));
        seed_record_line(dir.path(), task.as_ref(), t - 5, code.code());
        let scheduler = Scheduler::new(store_at(dir.path()));
        assert!(
            scheduler.should_run_at(task.as_ref(), t),
            "{} should be due again immediately",
            name
        );
    }

    // Success and Failure block until the window reopens.
    for (name, code) in [
        ("was-success", StatusCode::Success),
        ("was-failure", StatusCode::Failure),
    ] {
        let task = StubTask::new(name, Interval::Every(86_400));
        seed_record_line(dir.path(), task.as_ref(), t - 5, code.code());
        let scheduler = Scheduler::new(store_at(dir.path()));
        assert!(
            !scheduler.should_run_at(task.as_ref(), t),
            "{} should not be due inside the window",
            name
        );
    }
}

#[tokio::test]
async fn test_due_tasks_run_oldest_first() {
    let dir = TempDir::new().unwrap();
    let t = now();

    let a = StubTask::new("a", Interval::Every(60));
    let b = StubTask::new("b", Interval::Every(60));
    let c = StubTask::new("c", Interval::Every(60));
    seed_record_line(dir.path(), a.as_ref(), t - 300, StatusCode::Success.code());
    seed_record_line(dir.path(), b.as_ref(), t - 120, StatusCode::Success.code());
    // c has never run at all.

    let bus = EventBus::new();
    let handler = RecordingHandler::new();
    bus.register(handler.clone()).await;

    let mut scheduler = Scheduler::with_event_bus(store_at(dir.path()), bus);
    // Registration order deliberately differs from the expected run order.
    scheduler.register(a.clone());
    scheduler.register(b.clone());
    scheduler.register(c.clone());

    assert_eq!(scheduler.run(None).await.unwrap(), 3);

    // Never-run sorts first (time 0), then ascending last-execution time.
    let started: Vec<String> = handler
        .events()
        .await
        .into_iter()
        .filter_map(|event| match event {
            Event::TaskStarted { name, .. } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec!["c", "a", "b"]);
}

#[tokio::test]
async fn test_run_emits_lifecycle_events_in_order() {
    let dir = TempDir::new().unwrap();
    let task = StubTask::new("observed", Interval::Every(60));

    let bus = EventBus::new();
    let handler = RecordingHandler::new();
    bus.register(handler.clone()).await;

    let mut scheduler = Scheduler::with_event_bus(store_at(dir.path()), bus);
    scheduler.register(task.clone());
    scheduler.run(None).await.unwrap();

    let events = handler.events().await;
    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], Event::RunStarted { due: 1, .. }));
    assert!(matches!(events[1], Event::TaskStarted { .. }));
    assert!(matches!(
        events[2],
        Event::TaskFinished {
            status: StatusCode::Success,
            ..
        }
    ));
    assert!(matches!(
        events[3],
        Event::RunCompleted { processed: 1, .. }
    ));
}

#[tokio::test]
async fn test_zero_budget_returns_everything_to_the_queue() {
    let dir = TempDir::new().unwrap();
    let a = StubTask::new("a", Interval::Every(60));
    let b = StubTask::new("b", Interval::Every(60));

    let mut scheduler = Scheduler::new(store_at(dir.path()));
    scheduler.register(a.clone());
    scheduler.register(b.clone());

    let processed = scheduler.run(Some(Duration::ZERO)).await.unwrap();
    assert_eq!(processed, 0);
    assert_eq!(a.calls() + b.calls(), 0);
    assert_eq!(scheduler.queued().len(), 2);
    assert!(scheduler.finished().is_empty());

    // The tasks are not failed; the next unbudgeted cycle runs them.
    assert_eq!(scheduler.run(None).await.unwrap(), 2);
    assert_eq!(a.calls() + b.calls(), 2);
}

#[tokio::test]
async fn test_processed_count_counts_attempts_not_successes() {
    let dir = TempDir::new().unwrap();
    let good = StubTask::new("good", Interval::Every(60));
    let bad = minuterie::testing::FlakyTask::new("bad", Interval::Every(60), u32::MAX);

    let mut scheduler = Scheduler::new(store_at(dir.path()));
    scheduler.register(good.clone());
    scheduler.register(bad.clone());

    assert_eq!(scheduler.run(None).await.unwrap(), 2);

    let statuses: Vec<StatusCode> = scheduler
        .finished()
        .iter()
        .map(|runner| runner.status())
        .collect();
    assert!(statuses.contains(&StatusCode::Success));
    assert!(statuses.contains(&StatusCode::Failure));
}
