//! External command task implementation.
//!
//! [`CommandTask`] wraps a shell command or external executable as a
//! schedulable task. Stdout and stderr are captured; a zero exit status
//! becomes a `Success` outcome carrying the trimmed output, any other exit
//! status fails the task.
//!
//! ```rust
//! use minuterie::CommandTask;
//!
//! let task = CommandTask::builder("pg_dump")
//!     .name("backup")
//!     .every(3600)
//!     .args(["-f", "/backups/db.sql", "mydb"])
//!     .build();
//! ```

use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use tokio::process::Command;

use crate::core::interval::Interval;
use crate::core::outcome::Outcome;
use crate::core::task::{Task, TaskError};
use crate::runner::Runner;

/// Default interval for commands built without an explicit `every`.
const DEFAULT_EVERY_SECS: u64 = 3600;

/// A task that runs an external command.
pub struct CommandTask {
    name: String,
    program: String,
    args: Vec<String>,
    every: u64,
    working_dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl CommandTask {
    /// Start building a command task for the given program.
    pub fn builder(program: impl Into<String>) -> CommandTaskBuilder {
        CommandTaskBuilder {
            name: None,
            program: program.into(),
            args: Vec::new(),
            every: DEFAULT_EVERY_SECS,
            working_dir: None,
            envs: Vec::new(),
        }
    }

    /// The program this task executes.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The configured arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Builder for [`CommandTask`].
pub struct CommandTaskBuilder {
    name: Option<String>,
    program: String,
    args: Vec<String>,
    every: u64,
    working_dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl CommandTaskBuilder {
    /// Set the task name; defaults to the program.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the interval in seconds between runs.
    pub fn every(mut self, secs: u64) -> Self {
        self.every = secs;
        self
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory for the command.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable for the command.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Finish building.
    pub fn build(self) -> CommandTask {
        CommandTask {
            name: self.name.unwrap_or_else(|| self.program.clone()),
            program: self.program,
            args: self.args,
            every: self.every,
            working_dir: self.working_dir,
            envs: self.envs,
        }
    }
}

#[async_trait]
impl Task for CommandTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Interval {
        Interval::Every(self.every)
    }

    async fn start(&self, _runner: &Runner) -> Result<Outcome, TaskError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in &self.envs {
            command.env(key, value);
        }

        let output = command.output().await?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            Ok(Outcome::success_with(json!({
                "stdout": stdout,
                "stderr": stderr,
            })))
        } else {
            let code = output.status.code().unwrap_or(-1);
            tracing::debug!(
                task = self.name.as_str(),
                code,
                stderr = stderr.as_str(),
                "command failed"
            );
            Err(TaskError::CommandFailed(code))
        }
    }
}
