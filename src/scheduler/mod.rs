//! Scheduler: task queue, due-time decisions and run-cycle execution.

mod engine;

pub use engine::{EPOCH_FLOOR, MAX_RUNNING_SECS, Scheduler, SchedulerError};
