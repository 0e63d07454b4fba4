//! Task data model for the per-branch backlog.
//!
//! Tasks are the atomic units of work handed to the external agent. Each
//! task tracks its content, status, timestamps, and an optional
//! prerequisite task.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Identifier for a task within a branch's task list.
///
/// Ids are sequential and human-readable (`task-001`, `task-002`, ...),
/// allocated from the list's persisted counter. Any string is accepted as a
/// lookup key; lookups with an unknown id simply miss.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Build the id for the given ordinal, e.g. 7 -> `task-007`.
    pub fn from_ordinal(n: u64) -> Self {
        Self(format!("task-{:03}", n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the numeric suffix, e.g. `task-012` -> 12.
    ///
    /// Returns `None` for ids that don't follow the `task-NNN` shape; those
    /// still work as opaque keys.
    pub fn ordinal(&self) -> Option<u64> {
        self.0.strip_prefix("task-")?.parse().ok()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Task status in its lifecycle.
///
/// A task is either waiting to be worked on or done. Failure bookkeeping is
/// run-scoped orchestrator state and is never persisted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
        }
    }

    /// Parse a status string, falling back to `Pending` for anything
    /// unrecognized. Load-time corruption must never be fatal.
    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "completed" => TaskStatus::Completed,
            _ => TaskStatus::Pending,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single task in the backlog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique, immutable identifier.
    pub id: TaskId,
    /// What the agent should do.
    pub content: String,
    /// Current status.
    pub status: TaskStatus,
    /// Creation time, epoch seconds.
    pub created: i64,
    /// Completion time, epoch seconds. Set exactly once, on the
    /// pending -> completed transition.
    pub completed: Option<i64>,
    /// Optional prerequisite task that must complete first.
    pub after: Option<TaskId>,
}

impl Task {
    /// Create a new pending task with the current timestamp.
    pub fn new(id: TaskId, content: &str, after: Option<TaskId>) -> Self {
        Self {
            id,
            content: content.to_string(),
            status: TaskStatus::Pending,
            created: Utc::now().timestamp(),
            completed: None,
            after,
        }
    }

    /// Mark the task as completed and record the completion time.
    ///
    /// Returns false (and changes nothing) if the task was already done.
    pub fn mark_done(&mut self) -> bool {
        if self.status == TaskStatus::Completed {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.completed = Some(Utc::now().timestamp());
        true
    }

    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// The ordered task collection for one branch plus its id counter.
///
/// This is the sole mutable aggregate: it is loaded fresh from the object
/// store at the start of every invocation, mutated in memory, and written
/// back as one new blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskList {
    pub tasks: Vec<Task>,
    pub next_id: u64,
}

impl TaskList {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 1,
        }
    }

    /// Allocate the next sequential id, advancing the persisted counter.
    pub fn allocate_id(&mut self) -> TaskId {
        let id = TaskId::from_ordinal(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| &t.id == id)
    }

    /// Ids of tasks whose `after` targets the given task.
    pub fn dependents_of(&self, id: &TaskId) -> Vec<&TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.after.as_ref() == Some(id))
            .map(|t| &t.id)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_pending()).count()
    }
}

impl Default for TaskList {
    fn default() -> Self {
        Self::new()
    }
}
