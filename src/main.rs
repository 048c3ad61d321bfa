//! minuterie - a minimal recurring-task scheduler.
//!
//! Usage:
//!   minuterie run <schedule.yaml>      Execute one run-cycle and exit
//!   minuterie watch <schedule.yaml>    Keep running cycles until Ctrl+C
//!   minuterie list <schedule.yaml>     List tasks and their next due times
//!   minuterie records <schedule.yaml>  Dump the stored run records

use clap::{Parser, Subcommand};
use minuterie::{
    Event, EventBus, EventHandler, RecordStore, ScheduleFile, Scheduler, Task,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// minuterie - a minimal recurring-task scheduler
#[derive(Parser)]
#[command(name = "minuterie")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one run-cycle and exit (suitable for cron)
    Run {
        /// Path to the schedule YAML file
        #[arg(value_name = "SCHEDULE")]
        schedule: PathBuf,

        /// Stop starting further tasks after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Keep executing run-cycles until Ctrl+C
    Watch {
        /// Path to the schedule YAML file
        #[arg(value_name = "SCHEDULE")]
        schedule: PathBuf,

        /// Seconds between run-cycles (default: 10)
        #[arg(long, default_value = "10")]
        tick: u64,
    },

    /// List tasks and their next due times
    List {
        /// Path to the schedule YAML file
        #[arg(value_name = "SCHEDULE")]
        schedule: PathBuf,
    },

    /// Dump the stored run records
    Records {
        /// Path to the schedule YAML file
        #[arg(value_name = "SCHEDULE")]
        schedule: PathBuf,
    },
}

/// Simple logging event handler that prints scheduling events.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::RunStarted { due, .. } => {
                info!("Run started: {} task(s) due", due);
            }
            Event::RunCompleted {
                processed,
                duration,
                ..
            } => {
                info!("Run completed: {} task(s) processed in {:?}", processed, duration);
            }
            Event::TaskStarted { name, .. } => {
                info!("  Task '{}' started", name);
            }
            Event::TaskFinished {
                name,
                status,
                duration,
                ..
            } => {
                let duration_info = duration
                    .map(|secs| format!(" in {}s", secs))
                    .unwrap_or_default();
                info!("  Task '{}' finished: {}{}", name, status, duration_info);
            }
            Event::TaskExiting { name, .. } => {
                warn!("  Task '{}' interrupted by shutdown", name);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { schedule, timeout } => {
            run_once(schedule, timeout.map(Duration::from_secs)).await?;
        }
        Commands::Watch { schedule, tick } => {
            watch(schedule, tick).await?;
        }
        Commands::List { schedule } => {
            list_tasks(schedule)?;
        }
        Commands::Records { schedule } => {
            dump_records(schedule)?;
        }
    }

    Ok(())
}

/// Build a scheduler from a schedule file, with logging events attached.
async fn build_scheduler(
    schedule: &PathBuf,
) -> Result<Scheduler, Box<dyn std::error::Error>> {
    let file = ScheduleFile::load(schedule)?;

    let store = match &file.storage_dir {
        Some(dir) => Arc::new(RecordStore::new(dir)),
        None => Arc::new(RecordStore::in_temp_dir()),
    };
    if !store.is_durable() {
        warn!(
            "Record directory {} is not writable; records will not survive restarts",
            store.dir().display()
        );
    }

    let event_bus = EventBus::new();
    event_bus.register(Arc::new(LoggingHandler)).await;

    let mut scheduler = Scheduler::with_event_bus(store, event_bus);

    let tasks = file.build_tasks();
    if tasks.is_empty() {
        warn!("No enabled tasks in {}", schedule.display());
    }
    info!("Loaded {} task(s):", tasks.len());
    for task in tasks {
        info!("  - {} (every {:?})", task.name(), task.interval());
        scheduler.register(Arc::new(task));
    }

    Ok(scheduler)
}

/// Execute one run-cycle.
async fn run_once(
    schedule: PathBuf,
    timeout: Option<Duration>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut scheduler = build_scheduler(&schedule).await?;
    let processed = scheduler.run(timeout).await?;
    info!("Processed {} task(s)", processed);
    Ok(())
}

/// Run cycles on a fixed tick until Ctrl+C.
async fn watch(schedule: PathBuf, tick: u64) -> Result<(), Box<dyn std::error::Error>> {
    let mut scheduler = build_scheduler(&schedule).await?;
    let exit_guard = Arc::clone(scheduler.exit_guard());

    info!("Watching (tick: {}s). Press Ctrl+C to stop", tick);

    let mut interval = tokio::time::interval(Duration::from_secs(tick));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = scheduler.run(None).await {
                    error!("Run-cycle refused: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                // Reclassify anything still mid-flight before exiting.
                let flushed = exit_guard.flush().await;
                if flushed > 0 {
                    warn!("Marked {} in-flight task(s) as exited", flushed);
                }
                break;
            }
        }
    }

    info!("Goodbye!");
    Ok(())
}

/// List tasks and their next due instants.
fn list_tasks(schedule: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let file = ScheduleFile::load(&schedule)?;
    let store = match &file.storage_dir {
        Some(dir) => Arc::new(RecordStore::new(dir)),
        None => Arc::new(RecordStore::in_temp_dir()),
    };
    let scheduler = Scheduler::new(store);

    if file.tasks.is_empty() {
        println!("No tasks in {}", schedule.display());
        return Ok(());
    }

    println!("Tasks in {}:", schedule.display());
    println!();
    for task in file.build_tasks() {
        let next = scheduler.next_run_date(&task);
        println!("{}", task.name());
        println!("  Identity: {}", task.identity());
        println!("  Interval: {:?}", task.interval());
        match next {
            Some(at) => println!("  Next due: {}", at),
            None => println!("  Next due: never (disabled)"),
        }
        println!();
    }
    Ok(())
}

/// Dump the stored record map.
fn dump_records(schedule: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let file = ScheduleFile::load(&schedule)?;
    let store = match &file.storage_dir {
        Some(dir) => RecordStore::new(dir),
        None => RecordStore::in_temp_dir(),
    };

    let records = store.all();
    if records.is_empty() {
        println!("No records in {}", store.path().display());
        return Ok(());
    }

    println!("Records in {}:", store.path().display());
    println!();
    for record in records {
        println!("{}", record.identity());
        println!("  Last run: {}", record.last_execution_time());
        println!("  Status:   {}", record.status_code());
        if let Some(message) = record.message() {
            println!("  Message:  {}", message);
        }
        println!();
    }
    Ok(())
}
