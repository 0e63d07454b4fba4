//! Versioned on-disk format for the task list blob.
//!
//! The blob is line-delimited JSON: one self-describing record per line,
//! each carrying a `record` tag and a format `version`. The first record is
//! the meta line holding the id counter; every following line is a task.
//!
//! Loading is deliberately lenient. The backing store has no transactions,
//! so a half-corrupted blob must still load: bad lines are skipped, unknown
//! record tags are ignored, and unparsable fields fall back to safe
//! defaults. Serialization always writes the current format.

use serde::Serialize;
use serde_json::Value;

use crate::store::task::{Task, TaskId, TaskList, TaskStatus};
use crate::{rlog_trace, rlog_warn, Result};

/// Current format version, stamped on every record.
const FORMAT_VERSION: u64 = 1;

#[derive(Serialize)]
struct MetaRecord<'a> {
    record: &'a str,
    version: u64,
    next_id: u64,
}

#[derive(Serialize)]
struct TaskRecord<'a> {
    record: &'a str,
    version: u64,
    #[serde(flatten)]
    task: &'a Task,
}

/// Serialize a task list to the line-delimited blob format.
pub fn serialize(list: &TaskList) -> Result<Vec<u8>> {
    let mut out = String::new();
    let meta = MetaRecord {
        record: "meta",
        version: FORMAT_VERSION,
        next_id: list.next_id,
    };
    out.push_str(&serde_json::to_string(&meta)?);
    out.push('\n');

    for task in &list.tasks {
        let record = TaskRecord {
            record: "task",
            version: FORMAT_VERSION,
            task,
        };
        out.push_str(&serde_json::to_string(&record)?);
        out.push('\n');
    }

    Ok(out.into_bytes())
}

/// Load a task list from blob bytes.
///
/// Never fails: corruption degrades to skipped records, and the id counter
/// is recovered from the surviving task ids when the meta line is missing
/// or damaged.
pub fn deserialize(bytes: &[u8]) -> TaskList {
    let text = String::from_utf8_lossy(bytes);
    let mut list = TaskList::new();
    let mut meta_next_id: Option<u64> = None;

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                rlog_warn!("Skipping unparsable record at line {}: {}", lineno + 1, e);
                continue;
            }
        };

        match value.get("record").and_then(Value::as_str) {
            Some("meta") => {
                meta_next_id = value.get("next_id").and_then(Value::as_u64);
            }
            Some("task") => {
                if let Some(task) = parse_task(&value, lineno + 1) {
                    if list.get(&task.id).is_some() {
                        rlog_warn!(
                            "Skipping duplicate task id {} at line {}",
                            task.id,
                            lineno + 1
                        );
                        continue;
                    }
                    rlog_trace!("Loaded {}", task.id);
                    list.tasks.push(task);
                }
            }
            tag => {
                // Unknown tags may come from a newer writer; ignore them
                rlog_warn!("Skipping record with tag {:?} at line {}", tag, lineno + 1);
            }
        }
    }

    // Recover the counter: trust the meta line when present, but never let
    // it fall behind the highest surviving id
    let max_ordinal = list
        .tasks
        .iter()
        .filter_map(|t| t.id.ordinal())
        .max()
        .unwrap_or(0);
    list.next_id = meta_next_id.unwrap_or(0).max(max_ordinal + 1);

    list
}

/// Extract a task from a record value, field by field.
///
/// A record without an id is unusable and skipped; every other field falls
/// back to a safe default when missing or of the wrong type.
fn parse_task(value: &Value, lineno: usize) -> Option<Task> {
    let id = match value.get("id").and_then(Value::as_str) {
        Some(s) if !s.is_empty() => TaskId::from(s),
        _ => {
            rlog_warn!("Skipping task record without id at line {}", lineno);
            return None;
        }
    };

    let content = value
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let status = value
        .get("status")
        .and_then(Value::as_str)
        .map(TaskStatus::parse_or_default)
        .unwrap_or_default();

    let created = value.get("created").and_then(Value::as_i64).unwrap_or(0);

    let completed = value.get("completed").and_then(Value::as_i64);

    let after = value
        .get("after")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(TaskId::from);

    // Re-establish the status/timestamp invariant after lenient parsing
    let completed = match status {
        TaskStatus::Completed => Some(completed.unwrap_or(0)),
        TaskStatus::Pending => None,
    };

    Some(Task {
        id,
        content,
        status,
        created,
        completed,
        after,
    })
}
