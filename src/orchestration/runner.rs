//! The supervisory task loop.
//!
//! Each iteration loads the task list fresh, selects a ready task that
//! hasn't tripped the circuit breaker, dispatches the agent on it, and
//! scores the exit status. The loop never marks tasks done itself; the
//! agent calls `ralph task done` from inside its session, so a task whose
//! agent exited cleanly but forgot the call is simply selected again.
//!
//! Parallelism is bounded child-process supervision, not threading: up to N
//! children run concurrently, reaped with non-blocking `try_wait` scans on
//! a fixed interval. Any child still running when the loop stops is
//! force-terminated.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command, Output as ProcessOutput, Stdio};
use std::thread;
use std::time::Duration;

use chrono::Utc;

use crate::config;
use crate::orchestration::executor::{Executor, Interaction, Invocation, Output};
use crate::orchestration::failure::{FailureTracker, FAILURE_THRESHOLD};
use crate::orchestration::prompt;
use crate::orchestration::resolver;
use crate::store::task::{Task, TaskId, TaskList};
use crate::store::TaskStore;
use crate::{rlog, rlog_debug, rlog_warn, Result};

/// Interval between non-blocking scans of running children.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Options for one run of the loop.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Model passed through to the executor backend.
    pub model: Option<String>,
    /// Dispatch exactly one task, then stop.
    pub once: bool,
    /// Print invocations and synthesize success without spawning anything.
    pub dry_run: bool,
    /// Sleep between iterations.
    pub delay: Duration,
    /// Stop after this many successful executions.
    pub max_tasks: Option<u32>,
    /// Maximum concurrently running agent processes. 1 means sequential.
    pub parallel: usize,
    /// Streamed (per-task log file) or buffered agent output.
    pub output: Output,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            model: None,
            once: false,
            dry_run: false,
            delay: Duration::ZERO,
            max_tasks: None,
            parallel: 1,
            output: Output::Buffered,
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No pending tasks remain.
    BacklogDrained,
    /// Pending tasks remain, but every one is blocked or has exceeded the
    /// failure threshold for this run.
    RemainingTasksStuck,
    /// `once` was set and one task was dispatched.
    OnceDone,
    /// The configured max successful executions was reached.
    MaxTasksReached,
}

/// What happened during a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Agent executions that exited successfully.
    pub completed: u32,
    /// Total agent executions attempted (including dry-run synthesized ones).
    pub attempts: u32,
    /// Tasks retired by the circuit breaker.
    pub tripped: Vec<TaskId>,
    pub outcome: RunOutcome,
}

/// A dispatched child in parallel mode.
struct RunningTask {
    id: TaskId,
    content: String,
    child: Child,
}

pub struct Runner {
    store: TaskStore,
    executor: Executor,
    opts: RunOptions,
    workdir: PathBuf,
    logs_dir: PathBuf,
    tracker: FailureTracker,
    /// Successes synthesized by dry-run, so the dry walk covers each task
    /// once and releases its dependents. Never persisted.
    dry_completed: HashSet<TaskId>,
}

impl Runner {
    pub fn new(store: TaskStore, executor: Executor, opts: RunOptions) -> Result<Self> {
        let workdir = store.workdir()?;
        let logs_dir = config::logs_dir(&workdir);
        Ok(Self {
            store,
            executor,
            opts,
            workdir,
            logs_dir,
            tracker: FailureTracker::new(),
            dry_completed: HashSet::new(),
        })
    }

    /// Drive the loop until the backlog is exhausted or a stop condition
    /// triggers.
    pub fn run(&mut self) -> Result<RunSummary> {
        rlog!(
            "Run starting on {}: executor={}, parallel={}, dry_run={}",
            self.store.branch(),
            self.executor.program(),
            self.opts.parallel,
            self.opts.dry_run
        );

        // `once` and dry-run are inherently one-at-a-time
        if self.opts.parallel > 1 && !self.opts.once && !self.opts.dry_run {
            self.run_parallel()
        } else {
            self.run_sequential()
        }
    }

    fn run_sequential(&mut self) -> Result<RunSummary> {
        let mut completed = 0u32;
        let mut attempts = 0u32;

        let outcome = loop {
            let list = self.store.load()?;
            let tasks = self.effective_tasks(&list);
            let Some(task) = self.candidates(&tasks, &[]).into_iter().next() else {
                break self.termination(&tasks);
            };

            let success = self.execute_one(&task)?;
            attempts += 1;
            self.score(&task.id, success, &mut completed);

            if self.opts.once {
                break RunOutcome::OnceDone;
            }
            if let Some(max) = self.opts.max_tasks {
                if completed >= max {
                    break RunOutcome::MaxTasksReached;
                }
            }
            self.throttle();
        };

        Ok(RunSummary {
            completed,
            attempts,
            tripped: self.tracker.tripped_ids(),
            outcome,
        })
    }

    fn run_parallel(&mut self) -> Result<RunSummary> {
        let mut running: Vec<RunningTask> = Vec::new();
        let mut completed = 0u32;
        let mut attempts = 0u32;

        let outcome = loop {
            // Select and top up to capacity
            let list = self.store.load()?;
            let tasks = self.effective_tasks(&list);
            let running_ids: Vec<TaskId> = running.iter().map(|r| r.id.clone()).collect();
            let candidates = self.candidates(&tasks, &running_ids);
            let had_candidates = !candidates.is_empty();

            for task in candidates {
                if running.len() >= self.opts.parallel {
                    break;
                }
                match self.spawn_detached(&task)? {
                    Some(child) => {
                        println!("→ {} {}", task.id, summarize(&task.content));
                        running.push(RunningTask {
                            id: task.id.clone(),
                            content: task.content.clone(),
                            child,
                        });
                    }
                    None => {
                        // Spawn failure counts as an execution failure
                        attempts += 1;
                        self.score(&task.id, false, &mut completed);
                    }
                }
            }

            if running.is_empty() {
                if had_candidates {
                    // Everything we tried to spawn failed; re-select
                    continue;
                }
                break self.termination(&tasks);
            }

            // Await at least one exit
            let finished = self.poll_running(&mut running);
            for (task, success) in finished {
                attempts += 1;
                self.score(&task.id, success, &mut completed);
            }

            if let Some(max) = self.opts.max_tasks {
                if completed >= max {
                    break RunOutcome::MaxTasksReached;
                }
            }
            self.throttle();
        };

        // Force-terminate anything still running at loop exit
        for task in running.iter_mut() {
            rlog_warn!(
                "Terminating still-running {} ({}) at loop exit",
                task.id,
                summarize(&task.content)
            );
            println!("✂ {} terminated at loop exit", task.id);
            let _ = task.child.kill();
            let _ = task.child.wait();
        }

        Ok(RunSummary {
            completed,
            attempts,
            tripped: self.tracker.tripped_ids(),
            outcome,
        })
    }

    /// The task list as the loop sees it: in dry-run mode, synthesized
    /// completions are applied to a working copy so dependents unblock and
    /// already-walked tasks drop out of the pending set.
    fn effective_tasks(&self, list: &TaskList) -> Vec<Task> {
        let mut tasks = list.tasks.clone();
        if self.opts.dry_run {
            for task in tasks.iter_mut() {
                if self.dry_completed.contains(&task.id) {
                    task.mark_done();
                }
            }
        }
        tasks
    }

    /// Ready tasks eligible for dispatch: not tripped, not already running.
    fn candidates(&self, tasks: &[Task], running: &[TaskId]) -> Vec<Task> {
        resolver::ready(tasks)
            .into_iter()
            .filter(|t| !self.tracker.is_tripped(&t.id))
            .filter(|t| !running.contains(&t.id))
            .cloned()
            .collect()
    }

    /// Termination outcome when nothing is ready and nothing is running.
    fn termination(&self, tasks: &[Task]) -> RunOutcome {
        let pending = tasks.iter().filter(|t| t.is_pending()).count();
        if pending == 0 {
            RunOutcome::BacklogDrained
        } else {
            RunOutcome::RemainingTasksStuck
        }
    }

    fn build_invocation(&self, task: &Task) -> Invocation {
        let rendered = prompt::task_prompt(task);
        self.executor.invocation(
            &rendered,
            Interaction::Headless,
            self.opts.output,
            self.opts.model.as_deref(),
        )
    }

    /// Execute one task to completion (sequential mode). Spawn failures and
    /// non-zero exits are execution failures, not errors; only environment
    /// problems (log file IO) abort the run.
    fn execute_one(&mut self, task: &Task) -> Result<bool> {
        let invocation = self.build_invocation(task);

        if self.opts.dry_run {
            println!("[dry-run] {}: {}", task.id, invocation.command_line());
            return Ok(true);
        }

        println!("→ {} {}", task.id, summarize(&task.content));
        rlog_debug!("Spawning for {}: {}", task.id, invocation.command_line());

        match self.opts.output {
            Output::Streamed => {
                let log = self.open_log(&task.id)?;
                let status = Command::new(&invocation.program)
                    .args(&invocation.args)
                    .current_dir(&self.workdir)
                    .stdin(Stdio::null())
                    .stdout(log)
                    .status();
                match status {
                    Ok(status) => Ok(status.success()),
                    Err(e) => {
                        rlog_warn!("Failed to spawn {} for {}: {}", invocation.program, task.id, e);
                        eprintln!("warning: failed to spawn {}: {}", invocation.program, e);
                        Ok(false)
                    }
                }
            }
            Output::Buffered => {
                let output = Command::new(&invocation.program)
                    .args(&invocation.args)
                    .current_dir(&self.workdir)
                    .stdin(Stdio::null())
                    .output();
                match output {
                    Ok(output) if output.status.success() => Ok(true),
                    Ok(output) => {
                        self.write_failure_log(&task.id, &output)?;
                        Ok(false)
                    }
                    Err(e) => {
                        rlog_warn!("Failed to spawn {} for {}: {}", invocation.program, task.id, e);
                        eprintln!("warning: failed to spawn {}: {}", invocation.program, e);
                        Ok(false)
                    }
                }
            }
        }
    }

    /// Spawn a task's agent without waiting (parallel mode). Both output
    /// streams go to the task's dedicated log file. Returns `None` when the
    /// spawn itself fails.
    fn spawn_detached(&mut self, task: &Task) -> Result<Option<Child>> {
        let invocation = self.build_invocation(task);
        rlog_debug!("Spawning for {}: {}", task.id, invocation.command_line());

        let log = self.open_log(&task.id)?;
        let log_err = log.try_clone()?;
        match Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err)
            .spawn()
        {
            Ok(child) => Ok(Some(child)),
            Err(e) => {
                rlog_warn!("Failed to spawn {} for {}: {}", invocation.program, task.id, e);
                eprintln!("warning: failed to spawn {}: {}", invocation.program, e);
                Ok(None)
            }
        }
    }

    /// Scan running children until at least one has exited, reaping every
    /// exit found in that scan.
    fn poll_running(&mut self, running: &mut Vec<RunningTask>) -> Vec<(RunningTask, bool)> {
        loop {
            let mut finished = Vec::new();
            let mut i = 0;
            while i < running.len() {
                match running[i].child.try_wait() {
                    Ok(Some(status)) => {
                        let task = running.remove(i);
                        finished.push((task, status.success()));
                    }
                    Ok(None) => i += 1,
                    Err(e) => {
                        rlog_warn!("try_wait failed for {}: {}", running[i].id, e);
                        let mut task = running.remove(i);
                        let _ = task.child.kill();
                        let _ = task.child.wait();
                        finished.push((task, false));
                    }
                }
            }
            if !finished.is_empty() {
                return finished;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Apply the circuit breaker bookkeeping for one finished execution.
    fn score(&mut self, id: &TaskId, success: bool, completed: &mut u32) {
        if success {
            self.tracker.record_success(id);
            *completed += 1;
            if self.opts.dry_run {
                self.dry_completed.insert(id.clone());
            } else {
                rlog!("{} agent exited cleanly", id);
                println!("✓ {} agent exited cleanly", id);
            }
        } else {
            let count = self.tracker.record_failure(id);
            rlog_warn!("{} failed ({}/{})", id, count, FAILURE_THRESHOLD);
            println!("✗ {} failed ({}/{})", id, count, FAILURE_THRESHOLD);
            if count >= FAILURE_THRESHOLD {
                println!("  {} retired for the rest of this run", id);
            }
        }
    }

    fn throttle(&self) {
        if !self.opts.dry_run && !self.opts.delay.is_zero() {
            thread::sleep(self.opts.delay);
        }
    }

    /// Open the task's log file for appending, creating the logs directory
    /// lazily on first use.
    fn open_log(&self, id: &TaskId) -> Result<File> {
        fs::create_dir_all(&self.logs_dir)?;
        let path = self.logs_dir.join(format!("{}.log", id));
        Ok(OpenOptions::new().create(true).append(true).open(path)?)
    }

    /// Record a failed buffered execution in the task's log file.
    fn write_failure_log(&self, id: &TaskId, output: &ProcessOutput) -> Result<()> {
        let mut log = self.open_log(id)?;
        let exit = match output.status.code() {
            Some(code) => format!("exit {}", code),
            None => "killed by signal".to_string(),
        };
        writeln!(log, "==== {} {} failed ({}) ====", Utc::now().to_rfc3339(), id, exit)?;
        writeln!(log, "--- stdout ---")?;
        log.write_all(&output.stdout)?;
        writeln!(log, "--- stderr ---")?;
        log.write_all(&output.stderr)?;
        Ok(())
    }
}

/// First line of the content, shortened for progress output.
fn summarize(content: &str) -> String {
    let first = content.lines().next().unwrap_or("");
    if first.chars().count() > 60 {
        let head: String = first.chars().take(57).collect();
        format!("{}...", head)
    } else {
        first.to_string()
    }
}
