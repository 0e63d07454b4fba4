//! Dependency resolution over the task list.
//!
//! Pure functions partitioning pending tasks into ready and blocked sets.
//! A task is ready when it has no prerequisite, or its prerequisite exists
//! and is completed. A prerequisite that doesn't exist in the list blocks
//! its dependent forever; the store tolerates such dangling references and
//! the resolver simply never releases them.

use std::collections::HashSet;

use crate::store::task::{Task, TaskId};

/// Pending tasks that can be dispatched now, in original list order.
pub fn ready(tasks: &[Task]) -> Vec<&Task> {
    let completed: HashSet<&TaskId> = tasks
        .iter()
        .filter(|t| t.is_completed())
        .map(|t| &t.id)
        .collect();

    tasks
        .iter()
        .filter(|t| t.is_pending())
        .filter(|t| match &t.after {
            None => true,
            Some(dep) => completed.contains(dep),
        })
        .collect()
}

/// Pending tasks that cannot be dispatched yet, in original list order.
pub fn blocked(tasks: &[Task]) -> Vec<&Task> {
    let ready_ids: HashSet<&TaskId> = ready(tasks).into_iter().map(|t| &t.id).collect();

    tasks
        .iter()
        .filter(|t| t.is_pending() && !ready_ids.contains(&t.id))
        .collect()
}
