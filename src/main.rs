use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use ralph::config::Config;
use ralph::orchestration::{resolver, Executor, Output, Planner, RunOptions, RunOutcome, Runner};
use ralph::store::{Task, TaskId, TaskStore};
use ralph::{rlog, Error, Result};

/// Ralph - git-embedded task backlog and autonomous agent loop
#[derive(Parser, Debug)]
#[command(name = "ralph")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    RALPH_EXECUTOR        Agent backend: claude (default) or codex\n    RALPH_EXECUTOR_CMD    Full custom agent command line (bypasses backend names)\n    RALPH_DEBUG=1         Enable debug logging (alternative to --debug)"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.ralph/ralph.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Manage the task backlog for the current branch
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },

    /// Work through ready tasks with the agent until the backlog is done
    Run {
        /// Model passed to the agent backend
        #[arg(long)]
        model: Option<String>,

        /// Dispatch exactly one task, then stop
        #[arg(long)]
        once: bool,

        /// Print invocations without spawning any agent
        #[arg(long)]
        dry_run: bool,

        /// Seconds to sleep between iterations
        #[arg(long)]
        delay: Option<u64>,

        /// Stop after this many successful agent executions
        #[arg(long)]
        max_tasks: Option<u32>,

        /// Number of concurrently running agents
        #[arg(long)]
        parallel: Option<usize>,

        /// Agent output handling: buffered text or streamed JSON events
        #[arg(long, value_enum, default_value = "text")]
        output_format: OutputFormat,
    },

    /// Start an interactive planning session that fills the backlog
    Plan {
        /// Model passed to the agent backend
        #[arg(long)]
        model: Option<String>,

        /// Print the invocation without starting the session
        #[arg(long)]
        dry_run: bool,

        /// What to plan for
        description: Vec<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommand {
    /// Add a new task
    Add {
        /// Run only after this task has completed
        #[arg(long)]
        after: Option<String>,

        /// Print the created task as JSON
        #[arg(long)]
        json: bool,

        /// Task description
        #[arg(required = true)]
        content: Vec<String>,
    },

    /// List all tasks on the current branch
    List {
        /// Print tasks as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a single task
    Show {
        id: String,

        /// Print the task as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replace a task's content
    Edit {
        id: String,

        /// New task description
        #[arg(required = true)]
        content: Vec<String>,
    },

    /// Append to a task's content without replacing it
    Append {
        id: String,

        /// Extra description
        #[arg(required = true)]
        content: Vec<String>,
    },

    /// Delete a task (refused while other tasks depend on it)
    Delete { id: String },

    /// Mark a task done
    Done {
        id: String,

        /// Print the updated task as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    StreamJson,
}

fn main() {
    let cli = Cli::parse();
    ralph::log::init_with_debug(cli.debug);

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Task { command } => run_task(command),
        Command::Run {
            model,
            once,
            dry_run,
            delay,
            max_tasks,
            parallel,
            output_format,
        } => run_loop(model, once, dry_run, delay, max_tasks, parallel, output_format),
        Command::Plan {
            model,
            dry_run,
            description,
        } => run_plan(model, dry_run, description),
    }
}

fn open_store() -> Result<TaskStore> {
    TaskStore::open(&std::env::current_dir()?)
}

fn run_task(command: TaskCommand) -> Result<()> {
    let store = open_store()?;

    match command {
        TaskCommand::Add {
            after,
            json,
            content,
        } => {
            let task = store.add(&content.join(" "), after.map(TaskId::from))?;
            if json {
                print_json(&task)?;
            } else {
                match &task.after {
                    Some(dep) => println!("Added {} (after {}): {}", task.id, dep, task.content),
                    None => println!("Added {}: {}", task.id, task.content),
                }
            }
        }
        TaskCommand::List { json } => {
            let tasks = store.list()?;
            if json {
                print_json(&tasks)?;
            } else if tasks.is_empty() {
                println!("No tasks on branch {}.", store.branch());
            } else {
                for task in &tasks {
                    print_task_line(task);
                }
            }
        }
        TaskCommand::Show { id, json } => {
            let task = store.get(&TaskId::from(id))?;
            if json {
                print_json(&task)?;
            } else {
                println!("id:      {}", task.id);
                println!("status:  {}", task.status);
                println!("created: {}", format_timestamp(task.created));
                if let Some(done) = task.completed {
                    println!("done:    {}", format_timestamp(done));
                }
                if let Some(after) = &task.after {
                    println!("after:   {}", after);
                }
                println!("content: {}", task.content);
            }
        }
        TaskCommand::Edit { id, content } => {
            let task = store.edit(&TaskId::from(id), &content.join(" "))?;
            println!("Updated {}: {}", task.id, task.content);
        }
        TaskCommand::Append { id, content } => {
            let task = store.append(&TaskId::from(id), &content.join(" "))?;
            println!("Updated {}: {}", task.id, task.content);
        }
        TaskCommand::Delete { id } => {
            let id = TaskId::from(id);
            store.delete(&id)?;
            println!("Deleted {}.", id);
        }
        TaskCommand::Done { id, json } => {
            let id = TaskId::from(id);
            match store.mark_done(&id) {
                Ok(task) => {
                    if json {
                        print_json(&task)?;
                    } else {
                        println!("Marked {} done.", task.id);
                    }
                }
                // Idempotent for the agent: repeating the call is not a failure
                Err(Error::TaskAlreadyDone(_)) => {
                    if json {
                        print_json(&store.get(&id)?)?;
                    } else {
                        println!("{} is already done.", id);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_loop(
    model: Option<String>,
    once: bool,
    dry_run: bool,
    delay: Option<u64>,
    max_tasks: Option<u32>,
    parallel: Option<usize>,
    output_format: OutputFormat,
) -> Result<()> {
    let config = Config::load()?;
    let executor = Executor::from_env(config.executor.as_deref())?;

    // A missing backend binary is only a warning here: each spawn failure is
    // scored like any other execution failure and the breaker retires the task
    if !dry_run && executor.is_builtin() && which::which(executor.program()).is_err() {
        eprintln!(
            "warning: {} not found in PATH; task executions will fail",
            executor.program()
        );
    }

    let opts = RunOptions {
        model: model.or(config.model),
        once,
        dry_run,
        delay: Duration::from_secs(delay.or(config.delay_secs).unwrap_or(0)),
        max_tasks,
        parallel: parallel.or(config.parallel).unwrap_or(1).max(1),
        output: match output_format {
            OutputFormat::Text => Output::Buffered,
            OutputFormat::StreamJson => Output::Streamed,
        },
    };

    let store = open_store()?;
    let branch = store.branch().to_string();
    rlog!("ralph run on branch {}", branch);

    let mut runner = Runner::new(store, executor, opts)?;
    let summary = runner.run()?;

    match summary.outcome {
        RunOutcome::BacklogDrained if summary.attempts == 0 => {
            println!("No pending tasks on branch {}.", branch);
        }
        RunOutcome::BacklogDrained => {
            println!(
                "Backlog drained: {} successful execution(s) in {} attempt(s).",
                summary.completed, summary.attempts
            );
        }
        RunOutcome::RemainingTasksStuck => {
            println!("Stopping: remaining tasks are blocked or exceeded the failure threshold.");
            for id in &summary.tripped {
                println!("  {} hit the failure threshold", id);
            }
            let tasks = open_store()?.list()?;
            for task in resolver::blocked(&tasks) {
                match &task.after {
                    Some(dep) => println!("  {} blocked on {}", task.id, dep),
                    None => println!("  {} blocked", task.id),
                }
            }
        }
        RunOutcome::OnceDone => {
            println!(
                "Dispatched one task ({}).",
                if summary.completed > 0 { "succeeded" } else { "failed" }
            );
        }
        RunOutcome::MaxTasksReached => {
            println!(
                "Reached max tasks: {} successful execution(s).",
                summary.completed
            );
        }
    }

    Ok(())
}

fn run_plan(model: Option<String>, dry_run: bool, description: Vec<String>) -> Result<()> {
    let config = Config::load()?;
    let executor = Executor::from_env(config.executor.as_deref())?;
    let store = open_store()?;

    let description = description.join(" ");
    let description = description.trim();
    let description = if description.is_empty() {
        None
    } else {
        Some(description)
    };

    Planner::new(executor, model.or(config.model), dry_run).plan(&store, description)
}

fn print_task_line(task: &Task) {
    let after = match &task.after {
        Some(dep) => format!(" (after {})", dep),
        None => String::new(),
    };
    println!("{}  [{}]  {}{}", task.id, task.status, task.content, after);
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_timestamp(epoch: i64) -> String {
    use chrono::{DateTime, Utc};
    match DateTime::<Utc>::from_timestamp(epoch, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => epoch.to_string(),
    }
}
