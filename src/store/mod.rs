//! Durable task storage embedded in the host git repository.
//!
//! The task list for each branch lives as a single blob in the object
//! database, addressed by a ref under `refs/ralph/tasks/`. No working-tree
//! files, no external database.

pub mod object_store;
pub mod records;
pub mod task;
pub mod task_store;

pub use object_store::ObjectStore;
pub use task::{Task, TaskId, TaskList, TaskStatus};
pub use task_store::TaskStore;
