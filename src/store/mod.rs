//! Durable storage for last-run records.
//!
//! [`RecordStore`] is the only component that touches the shared record
//! file, so every cross-process concern (advisory locking, the line
//! format, self-healing of malformed lines) is centralized here.
//!
//! Storage failures are soft: if the record directory cannot be created or
//! the file cannot be opened, the store degrades to an in-memory-only map
//! and the scheduler keeps working without durability. Writers never block
//! on lock contention; a contended write is abandoned and retried on the
//! next state change.

mod line;
mod lock;

pub use line::LineError;

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::core::outcome::Outcome;
use crate::core::record::LastRecord;
use crate::core::task::Task;
use crate::core::types::{StatusCode, TaskIdentity};
use crate::runner::Runner;
use lock::FileLock;

/// File name of the record file inside the storage directory.
pub const RECORD_FILE_NAME: &str = "task_records";

/// Directory appended to the OS temp dir when no storage path is injected.
const FALLBACK_DIR_NAME: &str = "scheduler";

struct StoreState {
    /// Loaded at most once per process; `None` until first access.
    records: Option<HashMap<TaskIdentity, LastRecord>>,
    /// False once the directory or file proved unusable; the store then
    /// works purely in memory.
    durable: bool,
    /// Set when malformed lines were dropped during load.
    needs_rewrite: bool,
}

/// Gateway to the shared on-disk record map.
pub struct RecordStore {
    dir: PathBuf,
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl RecordStore {
    /// Create a store rooted at the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let path = dir.join(RECORD_FILE_NAME);
        Self {
            dir,
            path,
            state: Mutex::new(StoreState {
                records: None,
                durable: true,
                needs_rewrite: false,
            }),
        }
    }

    /// Create a store under the OS temp directory.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir().join(FALLBACK_DIR_NAME))
    }

    /// The storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The record file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether records are being persisted to disk.
    pub fn is_durable(&self) -> bool {
        let mut state = self.state();
        self.ensure_loaded(&mut state);
        state.durable
    }

    /// The last record for a task, or a fresh record (execution time 0) if
    /// the task has never run or the store is unavailable.
    pub fn record_for(&self, task: &dyn Task) -> LastRecord {
        let identity = task.identity();
        let mut state = self.state();
        self.ensure_loaded(&mut state)
            .get(&identity)
            .cloned()
            .unwrap_or_else(|| LastRecord::fresh(identity))
    }

    /// Look up a record by identity.
    pub fn get(&self, identity: &TaskIdentity) -> Option<LastRecord> {
        let mut state = self.state();
        self.ensure_loaded(&mut state).get(identity).cloned()
    }

    /// The last known status code for a task, so a freshly constructed task
    /// reflects prior runs after a restart.
    pub fn previous_code(&self, task: &dyn Task) -> StatusCode {
        self.record_for(task).status_code()
    }

    /// Snapshot of all records, ordered by identity.
    pub fn all(&self) -> Vec<LastRecord> {
        let mut state = self.state();
        let mut records: Vec<LastRecord> = self.ensure_loaded(&mut state).values().cloned().collect();
        records.sort_by(|a, b| a.identity().as_str().cmp(b.identity().as_str()));
        records
    }

    /// Record that a runner has begun: status forced to `Progress` and
    /// persisted immediately, so another scheduler process can observe the
    /// in-flight task even if this process dies next.
    pub(crate) fn start_progress(&self, runner: &mut Runner) {
        let record = runner.record().with_status_code(StatusCode::Progress);
        runner.set_record(record.clone());

        let mut state = self.state();
        self.ensure_loaded(&mut state)
            .insert(record.identity().clone(), record);
        self.persist_state(&mut state);
    }

    /// Record a skip. Skips are cheap and not worth a persist; the record
    /// reaches disk with the next durable state change.
    pub(crate) fn skip_progress(&self, runner: &mut Runner) {
        let record = runner.record().with_message(Outcome::Skipped(None));
        runner.set_record(record.clone());

        let mut state = self.state();
        self.ensure_loaded(&mut state)
            .insert(record.identity().clone(), record);
    }

    /// Exit path: if the runner is still mid-flight, downgrade it to
    /// `Exited` before persisting, so a killed process's task is not left
    /// looking perpetually in progress.
    pub(crate) fn store_exit(&self, runner: &mut Runner) {
        if runner.is_mid_flight() {
            runner.mark_exited();
        }
        let record = runner.record().clone();

        let mut state = self.state();
        self.ensure_loaded(&mut state)
            .insert(record.identity().clone(), record);
        self.persist_state(&mut state);
    }

    /// Exit path for a snapshot captured by the exit guard.
    pub(crate) fn store_exit_record(&self, record: &LastRecord) {
        let record = record.with_message(Outcome::Exited(None));

        let mut state = self.state();
        self.ensure_loaded(&mut state)
            .insert(record.identity().clone(), record);
        self.persist_state(&mut state);
    }

    /// Normal completion path. A record still reading `Progress` or `Queue`
    /// here defaults to `Success`, so a terminal run never stays recorded
    /// as non-terminal. An explicitly different terminal outcome wins.
    pub(crate) fn finish(&self, execution_time: i64, runner: &mut Runner) {
        let mut record = runner.record().with_last_execution_time(execution_time);
        if matches!(
            record.status_code(),
            StatusCode::Progress | StatusCode::Queue
        ) {
            record = record.with_status_code(StatusCode::Success);
        }
        runner.set_record(record.clone());

        let mut state = self.state();
        self.ensure_loaded(&mut state)
            .insert(record.identity().clone(), record);
        self.persist_state(&mut state);
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Load the record map from disk on first access.
    fn ensure_loaded<'a>(
        &self,
        state: &'a mut StoreState,
    ) -> &'a mut HashMap<TaskIdentity, LastRecord> {
        if state.records.is_none() {
            self.load_into(state);
            if state.needs_rewrite {
                // Opportunistically rewrite the file without the dropped
                // lines, now that the in-memory map is trusted.
                self.persist_state(state);
            }
        }
        state.records.get_or_insert_with(HashMap::new)
    }

    fn load_into(&self, state: &mut StoreState) {
        let mut records = HashMap::new();
        let mut dropped = 0usize;

        if let Err(e) = fs::create_dir_all(&self.dir) {
            tracing::warn!(
                dir = %self.dir.display(),
                error = %e,
                "record directory unavailable, running without persistence"
            );
            state.durable = false;
            state.records = Some(records);
            return;
        }

        let file = match self.open_record_file() {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "record file unavailable, running without persistence"
                );
                state.durable = false;
                state.records = Some(records);
                return;
            }
        };

        match FileLock::shared(file) {
            Ok(mut guard) => {
                let mut content = String::new();
                if let Err(e) = guard.read_to_string(&mut content) {
                    tracing::warn!(error = %e, "failed to read record file");
                }
                for raw in content.lines() {
                    match line::parse_line(raw) {
                        Ok(record) => {
                            records.insert(record.identity().clone(), record);
                        }
                        Err(e) => {
                            dropped += 1;
                            tracing::debug!(error = %e, line = raw, "dropping malformed record line");
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to lock record file for reading");
                state.durable = false;
            }
        }

        if dropped > 0 {
            tracing::warn!(dropped, "dropped malformed record lines; file will be rewritten");
            state.needs_rewrite = true;
        }
        state.records = Some(records);
    }

    /// Persist the in-memory map, rewriting the file in full.
    ///
    /// Takes a shared lock, then upgrades with a non-blocking exclusive
    /// lock. On contention the write is abandoned; the in-memory map stays
    /// correct for this process and the next state change retries.
    fn persist_state(&self, state: &mut StoreState) {
        if !state.durable {
            return;
        }
        let result = match state.records.as_ref() {
            Some(records) => self.write_records(records),
            None => return,
        };
        match result {
            Ok(true) => state.needs_rewrite = false,
            Ok(false) => {
                tracing::debug!(
                    path = %self.path.display(),
                    "record file locked by another writer, write abandoned"
                );
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to persist records"
                );
            }
        }
    }

    fn write_records(&self, records: &HashMap<TaskIdentity, LastRecord>) -> io::Result<bool> {
        let file = self.open_record_file()?;
        let mut guard = FileLock::shared(file)?;
        if !guard.try_upgrade_exclusive()? {
            return Ok(false);
        }

        let mut lines: Vec<String> = records.values().map(line::encode_line).collect();
        lines.sort();

        guard.set_len(0)?;
        guard.seek(SeekFrom::Start(0))?;
        guard.write_all(lines.join("\n").as_bytes())?;
        guard.flush()?;
        Ok(true)
    }

    fn open_record_file(&self) -> io::Result<fs::File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)
    }
}
