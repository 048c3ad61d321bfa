//! Record persistence integration tests.
//!
//! Verify that run outcomes written by one scheduler instance are visible
//! to a fresh one, that the on-disk line format holds its invariants, and
//! that a corrupted file heals itself.

use crate::common::{record_file, seed_record_line, store_at};
use minuterie::testing::StubTask;
use minuterie::{Interval, Outcome, RecordStore, Scheduler, StatusCode, Task};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_records_round_trip_through_a_fresh_store() {
    let dir = TempDir::new().unwrap();

    let tasks = [
        StubTask::new("alpha", Interval::Every(60)),
        StubTask::new("beta", Interval::Every(60)),
        StubTask::with_outcome(
            "gamma",
            Interval::Every(60),
            Outcome::success_with("payload text"),
        ),
    ];

    let mut scheduler = Scheduler::new(store_at(dir.path()));
    for task in &tasks {
        scheduler.register(task.clone());
    }
    assert_eq!(scheduler.run(None).await.unwrap(), 3);

    // A fresh store over the same directory must reproduce every record.
    let reloaded = store_at(dir.path());
    for task in &tasks {
        let original = scheduler.store().record_for(task.as_ref());
        let restored = reloaded.record_for(task.as_ref());

        assert_eq!(
            restored.last_execution_time(),
            original.last_execution_time(),
            "execution time must round-trip for '{}'",
            task.name()
        );
        assert_eq!(
            restored.status_code(),
            original.status_code(),
            "status must round-trip for '{}'",
            task.name()
        );
        assert_eq!(restored.message(), original.message());
    }

    // The payload survived the base64 envelope.
    let gamma = reloaded.record_for(tasks[2].as_ref());
    assert_eq!(
        gamma
            .message()
            .unwrap()
            .payload()
            .unwrap()
            .as_str()
            .unwrap(),
        "payload text"
    );
}

#[tokio::test]
async fn test_record_file_line_format() {
    let dir = TempDir::new().unwrap();
    let task = StubTask::new("formatted", Interval::Every(60));

    let mut scheduler = Scheduler::new(store_at(dir.path()));
    scheduler.register(task.clone());
    scheduler.run(None).await.unwrap();

    let content = fs::read_to_string(record_file(dir.path())).unwrap();
    let line = content.lines().next().unwrap();
    let fields: Vec<&str> = line.split('|').collect();

    assert_eq!(fields.len(), 4);
    assert_eq!(fields[0], task.identity().as_str());
    assert_eq!(fields[0].len(), 40);
    assert_eq!(fields[1].len(), 10);
    assert!(fields[1].bytes().all(|b| b.is_ascii_digit()));
    assert_eq!(fields[2], "1");
    assert!(!fields[3].is_empty());
}

#[tokio::test]
async fn test_malformed_lines_self_heal() {
    let dir = TempDir::new().unwrap();
    let task = StubTask::new("survivor", Interval::Every(60));

    // One legitimate record...
    let mut scheduler = Scheduler::new(store_at(dir.path()));
    scheduler.register(task.clone());
    scheduler.run(None).await.unwrap();
    let good_time = scheduler
        .store()
        .record_for(task.as_ref())
        .last_execution_time();

    // ...plus a line with a 39-character identity.
    let path = record_file(dir.path());
    let mut content = fs::read_to_string(&path).unwrap();
    content.push_str(&format!("\n{}|{:010}|1|", "a".repeat(39), good_time));
    fs::write(&path, &content).unwrap();

    // A fresh loader keeps the well-formed record and drops the bad line.
    let healed = store_at(dir.path());
    let record = healed.record_for(task.as_ref());
    assert_eq!(record.last_execution_time(), good_time);
    assert_eq!(record.status_code(), StatusCode::Success);

    // The rewrite leaves only the well-formed line behind.
    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 1);
    assert!(content.starts_with(task.identity().as_str()));
}

#[tokio::test]
async fn test_two_processes_share_the_record_file() {
    let dir = TempDir::new().unwrap();
    let task = StubTask::new("shared", Interval::Every(3600));

    // First "process" runs the task.
    let mut first = Scheduler::new(store_at(dir.path()));
    first.register(task.clone());
    assert_eq!(first.run(None).await.unwrap(), 1);

    // Second "process" (fresh store, fresh scheduler) sees the run and
    // does not execute again inside the interval window.
    let mut second = Scheduler::new(store_at(dir.path()));
    second.register(task.clone());
    assert_eq!(second.run(None).await.unwrap(), 0);
    assert_eq!(task.calls(), 1);
}

#[tokio::test]
async fn test_unwritable_storage_degrades_without_failing_the_run() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-directory");
    fs::write(&blocker, b"").unwrap();

    let store = Arc::new(RecordStore::new(blocker.join("sub")));
    assert!(!store.is_durable());

    let task = StubTask::new("undaunted", Interval::Every(60));
    let mut scheduler = Scheduler::new(store);
    scheduler.register(task.clone());

    // The run proceeds on the in-memory map.
    assert_eq!(scheduler.run(None).await.unwrap(), 1);
    assert_eq!(task.calls(), 1);
    assert_eq!(
        scheduler.store().record_for(task.as_ref()).status_code(),
        StatusCode::Success
    );
}

#[tokio::test]
async fn test_seeded_lines_parse_like_native_ones() {
    let dir = TempDir::new().unwrap();
    let task = StubTask::new("seeded", Interval::Every(60));
    seed_record_line(
        dir.path(),
        task.as_ref(),
        1_700_000_000,
        StatusCode::Stopped.code(),
    );

    let store = store_at(dir.path());
    let record = store.record_for(task.as_ref());
    assert_eq!(record.last_execution_time(), 1_700_000_000);
    assert_eq!(record.status_code(), StatusCode::Stopped);
    assert!(record.message().is_none());
}
