//! CLI-level tests for the task CRUD collaborator interface.
//!
//! These exercise the same commands the external agent calls back into
//! during a run, including the structured `--json` output mode.

use serde_json::Value;

use crate::fixtures::{stderr_of, stdout_of, TestRepo};

#[test]
fn test_add_list_show_roundtrip() {
    let repo = TestRepo::new();

    let add = repo.run_ralph(&["task", "add", "set", "up", "the", "schema"]);
    assert!(add.status.success(), "stderr: {}", stderr_of(&add));
    assert!(stdout_of(&add).contains("Added task-001"));
    // Multi-token content is joined with spaces
    assert!(stdout_of(&add).contains("set up the schema"));

    let list = repo.run_ralph(&["task", "list"]);
    assert!(list.status.success());
    let out = stdout_of(&list);
    assert!(out.contains("task-001"));
    assert!(out.contains("[pending]"));

    let show = repo.run_ralph(&["task", "show", "task-001"]);
    assert!(show.status.success());
    assert!(stdout_of(&show).contains("set up the schema"));
}

#[test]
fn test_json_output_is_machine_readable() {
    let repo = TestRepo::new();
    repo.run_ralph(&["task", "add", "first"]);
    repo.run_ralph(&["task", "add", "--after", "task-001", "second"]);

    let list = repo.run_ralph(&["task", "list", "--json"]);
    assert!(list.status.success());

    let tasks: Value = serde_json::from_str(&stdout_of(&list)).expect("list --json must parse");
    let tasks = tasks.as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0]["id"], "task-001");
    assert_eq!(tasks[0]["status"], "pending");
    assert_eq!(tasks[1]["after"], "task-001");

    let show = repo.run_ralph(&["task", "show", "task-002", "--json"]);
    let task: Value = serde_json::from_str(&stdout_of(&show)).expect("show --json must parse");
    assert_eq!(task["content"], "second");
}

#[test]
fn test_edit_and_append() {
    let repo = TestRepo::new();
    repo.run_ralph(&["task", "add", "original", "content"]);

    let edit = repo.run_ralph(&["task", "edit", "task-001", "replaced", "content"]);
    assert!(edit.status.success());

    let append = repo.run_ralph(&["task", "append", "task-001", "plus", "more"]);
    assert!(append.status.success());

    let show = repo.run_ralph(&["task", "show", "task-001", "--json"]);
    let task: Value = serde_json::from_str(&stdout_of(&show)).unwrap();
    assert_eq!(task["content"], "replaced content plus more");
}

#[test]
fn test_done_is_idempotent_at_the_cli() {
    let repo = TestRepo::new();
    repo.run_ralph(&["task", "add", "finish me"]);

    let first = repo.run_ralph(&["task", "done", "task-001"]);
    assert!(first.status.success());
    assert!(stdout_of(&first).contains("Marked task-001 done"));

    // A repeated call reports already-done and still exits 0, so a retrying
    // agent is never punished for the repeat
    let second = repo.run_ralph(&["task", "done", "task-001"]);
    assert!(second.status.success());
    assert!(stdout_of(&second).contains("already done"));
}

#[test]
fn test_done_unknown_task_fails() {
    let repo = TestRepo::new();
    let output = repo.run_ralph(&["task", "done", "task-042"]);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("Task not found"));
}

#[test]
fn test_delete_refused_while_dependents_exist() {
    let repo = TestRepo::new();
    repo.run_ralph(&["task", "add", "base"]);
    repo.run_ralph(&["task", "add", "--after", "task-001", "dependent"]);

    let refused = repo.run_ralph(&["task", "delete", "task-001"]);
    assert!(!refused.status.success());
    assert!(stderr_of(&refused).contains("task-002"));

    repo.run_ralph(&["task", "delete", "task-002"]);
    let allowed = repo.run_ralph(&["task", "delete", "task-001"]);
    assert!(allowed.status.success(), "stderr: {}", stderr_of(&allowed));
}

#[test]
fn test_empty_content_rejected() {
    let repo = TestRepo::new();
    let output = repo.run_ralph(&["task", "add", "   "]);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("must not be empty"));
}

#[test]
fn test_unknown_flag_is_a_usage_error() {
    let repo = TestRepo::new();
    let output = repo.run_ralph(&["task", "list", "--definitely-not-a-flag"]);
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_outside_a_repository_fails() {
    let outside = tempfile::TempDir::new().unwrap();

    let output = std::process::Command::new(env!("CARGO_BIN_EXE_ralph"))
        .args(["task", "list"])
        .current_dir(outside.path())
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_run_with_empty_backlog_spawns_nothing() {
    let repo = TestRepo::new();

    let output = repo.run_ralph(&["run"]);
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));
    assert!(stdout_of(&output).contains("No pending tasks"));
}

#[test]
fn test_invalid_executor_env_fails_fast() {
    let repo = TestRepo::new();
    repo.run_ralph(&["task", "add", "some work"]);

    let output = repo.run_ralph_env(&["run", "--once"], &[("RALPH_EXECUTOR", "frobnicator")]);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("Invalid executor"));

    // A full override bypasses backend name validation entirely
    let output = repo.run_ralph_env(
        &["run", "--once"],
        &[("RALPH_EXECUTOR", "frobnicator"), ("RALPH_EXECUTOR_CMD", "true")],
    );
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));
}

#[test]
fn test_run_dry_run_prints_invocation_without_spawning() {
    let repo = TestRepo::new();
    repo.run_ralph(&["task", "add", "dry walk me"]);

    let output = repo.run_ralph_env(
        &["run", "--dry-run"],
        &[("RALPH_EXECUTOR_CMD", "definitely-not-a-real-binary")],
    );
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));
    let out = stdout_of(&output);
    assert!(out.contains("[dry-run]"));
    assert!(out.contains("definitely-not-a-real-binary"));
    assert!(out.contains("task-001"));
}

#[test]
fn test_tasks_are_stored_in_git_not_the_worktree() {
    let repo = TestRepo::new();
    repo.run_ralph(&["task", "add", "invisible to the worktree"]);

    // Nothing but .git in the working tree
    let entries: Vec<_> = std::fs::read_dir(&repo.path)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name() != ".git")
        .collect();
    assert!(entries.is_empty(), "unexpected worktree entries: {:?}", entries);

    // And the backlog survives a fresh invocation
    let list = repo.run_ralph(&["task", "list"]);
    assert!(stdout_of(&list).contains("invisible to the worktree"));
}
