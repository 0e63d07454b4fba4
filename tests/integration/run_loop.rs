//! Sequential loop semantics: selection, circuit breaking, stop conditions,
//! and the mark-done contract between the loop and the agent.

use std::time::Duration;

use ralph::orchestration::{RunOptions, RunOutcome, Runner};
use ralph::store::TaskStore;

use crate::fixtures::TestRepo;

fn open_store(repo: &TestRepo) -> TaskStore {
    TaskStore::open(&repo.path).unwrap()
}

#[test]
fn test_empty_backlog_exits_cleanly_without_spawning() {
    let repo = TestRepo::new();
    let store = open_store(&repo);

    // Any spawn would fail loudly; the point is that none happens
    let script = repo.write_script("agent.sh", "echo SPAWNED > \"$(dirname \"$0\")/spawned\"; exit 1");
    let executor = repo.script_executor(&script);

    let mut runner = Runner::new(store, executor, RunOptions::default()).unwrap();
    let summary = runner.run().unwrap();

    assert_eq!(summary.attempts, 0);
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.outcome, RunOutcome::BacklogDrained);
    assert!(!repo.path.join("spawned").exists());
}

#[test]
fn test_circuit_breaker_retires_task_after_three_attempts() {
    let repo = TestRepo::new();
    let store = open_store(&repo);
    store.add("always fails", None).unwrap();

    let script = repo.write_script("agent.sh", "echo x >> \"$(dirname \"$0\")/attempts\"\nexit 1");
    let executor = repo.script_executor(&script);

    let mut runner = Runner::new(open_store(&repo), executor, RunOptions::default()).unwrap();
    let summary = runner.run().unwrap();

    // Exactly three attempts, then permanent skip and normal termination
    let attempts = std::fs::read_to_string(repo.path.join("attempts")).unwrap();
    assert_eq!(attempts.lines().count(), 3);
    assert_eq!(summary.attempts, 3);
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.outcome, RunOutcome::RemainingTasksStuck);
    assert_eq!(summary.tripped.len(), 1);
    assert_eq!(summary.tripped[0].as_str(), "task-001");
}

#[test]
fn test_breaker_reset_on_success() {
    let repo = TestRepo::new();
    let store = open_store(&repo);
    store.add("flaky task", None).unwrap();

    // Fails twice, then succeeds
    let script = repo.write_script(
        "agent.sh",
        concat!(
            "dir=\"$(dirname \"$0\")\"\n",
            "n=$(cat \"$dir/cnt\" 2>/dev/null | wc -l)\n",
            "echo x >> \"$dir/cnt\"\n",
            "if [ \"$n\" -lt 2 ]; then exit 1; fi\n",
            "exit 0"
        ),
    );
    let executor = repo.script_executor(&script);

    let opts = RunOptions {
        max_tasks: Some(1),
        ..RunOptions::default()
    };
    let mut runner = Runner::new(open_store(&repo), executor, opts).unwrap();
    let summary = runner.run().unwrap();

    // Two strikes never trip the breaker; the third attempt happens and wins
    assert_eq!(summary.attempts, 3);
    assert_eq!(summary.completed, 1);
    assert!(summary.tripped.is_empty());
    assert_eq!(summary.outcome, RunOutcome::MaxTasksReached);
}

#[test]
fn test_forgotten_mark_done_causes_reselection() {
    let repo = TestRepo::new();
    let store = open_store(&repo);
    store.add("agent forgets to mark done", None).unwrap();

    // Exits cleanly but never calls back into the task store
    let script = repo.write_script("agent.sh", "echo x >> \"$(dirname \"$0\")/runs\"\nexit 0");
    let executor = repo.script_executor(&script);

    let opts = RunOptions {
        max_tasks: Some(3),
        ..RunOptions::default()
    };
    let mut runner = Runner::new(open_store(&repo), executor, opts).unwrap();
    let summary = runner.run().unwrap();

    // The same task is selected again on every iteration, never hung on
    let runs = std::fs::read_to_string(repo.path.join("runs")).unwrap();
    assert_eq!(runs.lines().count(), 3);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.outcome, RunOutcome::MaxTasksReached);
}

#[test]
fn test_once_dispatches_exactly_one_task() {
    let repo = TestRepo::new();
    let store = open_store(&repo);
    store.add("first", None).unwrap();
    store.add("second", None).unwrap();

    let script = repo.write_script("agent.sh", "echo x >> \"$(dirname \"$0\")/runs\"\nexit 0");
    let executor = repo.script_executor(&script);

    let opts = RunOptions {
        once: true,
        ..RunOptions::default()
    };
    let mut runner = Runner::new(open_store(&repo), executor, opts).unwrap();
    let summary = runner.run().unwrap();

    let runs = std::fs::read_to_string(repo.path.join("runs")).unwrap();
    assert_eq!(runs.lines().count(), 1);
    assert_eq!(summary.attempts, 1);
    assert_eq!(summary.outcome, RunOutcome::OnceDone);
}

#[test]
fn test_agent_marking_done_drains_backlog_in_dependency_order() {
    let repo = TestRepo::new();
    let store = open_store(&repo);
    let first = store.add("build the base", None).unwrap();
    store.add("build on top", Some(first.id)).unwrap();

    // A well-behaved agent: records its task id, then marks it done through
    // the real CLI
    let body = format!(
        concat!(
            "id=$(printf '%s\\n' \"$1\" | sed -n 's/^You are working on \\(task-[0-9]*\\).*/\\1/p' | head -n1)\n",
            "echo \"$id\" >> \"$(dirname \"$0\")/order\"\n",
            "\"{}\" task done \"$id\""
        ),
        env!("CARGO_BIN_EXE_ralph")
    );
    let script = repo.write_script("agent.sh", &body);
    let executor = repo.script_executor(&script);

    let mut runner = Runner::new(open_store(&repo), executor, RunOptions::default()).unwrap();
    let summary = runner.run().unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.attempts, 2);
    assert_eq!(summary.outcome, RunOutcome::BacklogDrained);

    // The dependent is only released once its prerequisite completes
    let order = std::fs::read_to_string(repo.path.join("order")).unwrap();
    let lines: Vec<&str> = order.lines().collect();
    assert_eq!(lines, vec!["task-001", "task-002"]);

    let tasks = open_store(&repo).list().unwrap();
    assert!(tasks.iter().all(|t| t.is_completed()));
}

#[test]
fn test_dangling_prerequisite_terminates_as_stuck() {
    let repo = TestRepo::new();
    let store = open_store(&repo);
    store
        .add("waiting on a ghost", Some("task-999".into()))
        .unwrap();

    let script = repo.write_script("agent.sh", "echo SPAWNED > \"$(dirname \"$0\")/spawned\"; exit 0");
    let executor = repo.script_executor(&script);

    let mut runner = Runner::new(open_store(&repo), executor, RunOptions::default()).unwrap();
    let summary = runner.run().unwrap();

    // Permanently blocked: nothing dispatched, pending work remains
    assert_eq!(summary.attempts, 0);
    assert_eq!(summary.outcome, RunOutcome::RemainingTasksStuck);
    assert!(!repo.path.join("spawned").exists());
}

#[test]
fn test_dry_run_walks_backlog_without_spawning() {
    let repo = TestRepo::new();
    let store = open_store(&repo);
    let first = store.add("first", None).unwrap();
    store.add("second", Some(first.id)).unwrap();

    let script = repo.write_script("agent.sh", "echo SPAWNED > \"$(dirname \"$0\")/spawned\"; exit 0");
    let executor = repo.script_executor(&script);

    let opts = RunOptions {
        dry_run: true,
        delay: Duration::from_secs(60), // must be skipped in dry-run
        ..RunOptions::default()
    };
    let mut runner = Runner::new(open_store(&repo), executor, opts).unwrap();
    let summary = runner.run().unwrap();

    // Both tasks walked exactly once, dependency released by the
    // synthesized success, nothing spawned, nothing persisted
    assert_eq!(summary.attempts, 2);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.outcome, RunOutcome::BacklogDrained);
    assert!(!repo.path.join("spawned").exists());

    let tasks = open_store(&repo).list().unwrap();
    assert!(tasks.iter().all(|t| t.is_pending()));
}

#[test]
fn test_failure_log_written_for_buffered_failures() {
    let repo = TestRepo::new();
    let store = open_store(&repo);
    store.add("noisy failure", None).unwrap();

    let script = repo.write_script(
        "agent.sh",
        "echo some stdout\necho some stderr >&2\nexit 1",
    );
    let executor = repo.script_executor(&script);

    let mut runner = Runner::new(open_store(&repo), executor, RunOptions::default()).unwrap();
    runner.run().unwrap();

    let log = std::fs::read_to_string(repo.path.join(".ralph/logs/task-001.log")).unwrap();
    assert!(log.contains("task-001 failed (exit 1)"));
    assert!(log.contains("some stdout"));
    assert!(log.contains("some stderr"));
}
