//! Shared helpers for integration tests.

use minuterie::{RecordStore, Task};
use std::fs;
use std::path::{Path, PathBuf};

/// Path of the record file inside a storage directory.
pub fn record_file(dir: &Path) -> PathBuf {
    dir.join("task_records")
}

/// Append a raw record line for a task, bypassing the store.
///
/// Used to simulate records left behind by an earlier (possibly crashed)
/// scheduler process.
pub fn seed_record_line(dir: &Path, task: &dyn Task, time: i64, code: u8) {
    let path = record_file(dir);
    let line = format!("{}|{:010}|{}|\n", task.identity(), time, code);
    let mut content = fs::read_to_string(&path).unwrap_or_default();
    content.push_str(&line);
    fs::write(&path, content).unwrap();
}

/// A store over the given directory.
pub fn store_at(dir: &Path) -> std::sync::Arc<RecordStore> {
    std::sync::Arc::new(RecordStore::new(dir))
}
