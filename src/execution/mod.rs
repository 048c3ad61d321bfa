//! Task implementations for external work.

mod command;

pub use command::{CommandTask, CommandTaskBuilder};
