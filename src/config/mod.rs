//! Configuration loading and parsing.
//!
//! A schedule file is a YAML document listing command tasks and, optionally,
//! where run records are stored:
//!
//! ```yaml
//! storage_dir: /var/lib/minuterie
//! tasks:
//!   - name: backup
//!     every: 3600
//!     command: pg_dump
//!     args: ["-f", "/backups/db.sql", "mydb"]
//!   - name: healthcheck
//!     every: 300
//!     command: ./check.sh
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::execution::CommandTask;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse YAML.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Top-level schedule file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleFile {
    /// Directory for the record file; the OS temp dir is used when absent.
    pub storage_dir: Option<PathBuf>,
    /// Task definitions.
    pub tasks: Vec<TaskConfig>,
}

/// One command task definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task name; must be unique within the file.
    pub name: String,
    /// Interval in seconds between runs. Zero disables the task.
    pub every: u64,
    /// Program to execute.
    pub command: String,
    /// Program arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the command.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Whether the task is scheduled at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl ScheduleFile {
    /// Load and validate a schedule file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let file: ScheduleFile = serde_yaml::from_str(&content)?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if task.name.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "task name must not be empty".to_string(),
                ));
            }
            if task.command.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "task '{}' has an empty command",
                    task.name
                )));
            }
            if !seen.insert(task.name.clone()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "duplicate task name: {}",
                    task.name
                )));
            }
        }
        Ok(())
    }

    /// Build the enabled tasks as [`CommandTask`]s.
    pub fn build_tasks(&self) -> Vec<CommandTask> {
        self.tasks
            .iter()
            .filter(|config| config.enabled)
            .map(|config| {
                let mut builder = CommandTask::builder(&config.command)
                    .name(&config.name)
                    .every(config.every)
                    .args(config.args.iter().cloned());
                if let Some(dir) = &config.working_dir {
                    builder = builder.working_dir(dir);
                }
                for (key, value) in &config.env {
                    builder = builder.env(key, value);
                }
                builder.build()
            })
            .collect()
    }
}

/// Load the enabled tasks from a schedule file.
pub fn load_tasks(path: impl AsRef<Path>) -> Result<Vec<CommandTask>, ConfigError> {
    Ok(ScheduleFile::load(path)?.build_tasks())
}
