//! Per-task consecutive failure counting for the circuit breaker.

use std::collections::HashMap;

use crate::store::task::TaskId;

/// Consecutive failures after which a task is retired for the rest of the
/// current run.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Run-scoped failure bookkeeping.
///
/// Owned by the orchestrator for the duration of one run and never
/// persisted: a fresh run starts every task at zero strikes. Keys are owned
/// copies of the task ids, so entries stay valid however the task list is
/// reloaded underneath.
#[derive(Debug, Default)]
pub struct FailureTracker {
    counts: HashMap<String, u32>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure, returning the new consecutive count.
    /// The entry is created on the first failure.
    pub fn record_failure(&mut self, id: &TaskId) -> u32 {
        let count = self.counts.entry(id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Record a success, resetting the task's count to zero.
    pub fn record_success(&mut self, id: &TaskId) {
        self.counts.remove(id.as_str());
    }

    /// Current consecutive failure count for a task.
    pub fn count(&self, id: &TaskId) -> u32 {
        self.counts.get(id.as_str()).copied().unwrap_or(0)
    }

    /// Whether the task has hit the threshold and is retired for this run.
    pub fn is_tripped(&self, id: &TaskId) -> bool {
        self.count(id) >= FAILURE_THRESHOLD
    }

    /// Ids that have tripped the breaker, for reporting.
    pub fn tripped_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<&String> = self
            .counts
            .iter()
            .filter(|(_, c)| **c >= FAILURE_THRESHOLD)
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids.into_iter().map(|id| TaskId::from(id.clone())).collect()
    }
}
