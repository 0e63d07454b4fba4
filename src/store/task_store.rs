//! Branch-scoped task CRUD on top of the object store.
//!
//! Every operation loads the list fresh, mutates it in memory, and persists
//! it back as one new blob with an atomic ref repoint. There is no
//! cross-invocation cache and no locking; concurrent writers race and the
//! later write wins.

use std::path::{Path, PathBuf};

use crate::store::object_store::ObjectStore;
use crate::store::records;
use crate::store::task::{Task, TaskId, TaskList};
use crate::{rlog_debug, Error, Result};

pub struct TaskStore {
    store: ObjectStore,
    branch: String,
}

impl TaskStore {
    /// Open the task store for the current branch of the repository
    /// containing `path`.
    ///
    /// # Errors
    /// Fails when the path is not a repository, HEAD is detached, or the
    /// branch name would overflow the task ref.
    pub fn open(path: &Path) -> Result<Self> {
        let store = ObjectStore::discover(path)?;
        let branch = store.current_branch()?;
        // Validate the ref length up front so a bad branch name fails the
        // command immediately instead of on first write
        ObjectStore::tasks_ref(&branch)?;
        rlog_debug!("TaskStore::open branch={}", branch);
        Ok(Self { store, branch })
    }

    /// Open the task store for an explicit branch, bypassing HEAD.
    pub fn for_branch(path: &Path, branch: &str) -> Result<Self> {
        let store = ObjectStore::discover(path)?;
        ObjectStore::tasks_ref(branch)?;
        Ok(Self {
            store,
            branch: branch.to_string(),
        })
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn workdir(&self) -> Result<PathBuf> {
        self.store.workdir()
    }

    /// Load the task list for this branch. An absent ref means no tasks yet.
    pub fn load(&self) -> Result<TaskList> {
        match self.store.read_ref(&self.branch)? {
            Some(bytes) => Ok(records::deserialize(&bytes)),
            None => Ok(TaskList::new()),
        }
    }

    fn save(&self, list: &TaskList) -> Result<()> {
        let bytes = records::serialize(list)?;
        let blob_id = self.store.write_blob(&bytes)?;
        self.store.update_ref(&self.branch, &blob_id)
    }

    /// Create a new task and persist immediately.
    ///
    /// `content` must be non-empty after trimming. `after` is accepted even
    /// when it doesn't resolve to an existing task; such a task stays
    /// blocked until the target appears and completes.
    pub fn add(&self, content: &str, after: Option<TaskId>) -> Result<Task> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::Validation(
                "task content must not be empty".to_string(),
            ));
        }

        let mut list = self.load()?;
        let id = list.allocate_id();
        let task = Task::new(id, content, after);
        rlog_debug!("TaskStore::add {} on {}", task.id, self.branch);
        list.tasks.push(task.clone());
        self.save(&list)?;
        Ok(task)
    }

    /// All tasks in insertion order.
    pub fn list(&self) -> Result<Vec<Task>> {
        Ok(self.load()?.tasks)
    }

    pub fn get(&self, id: &TaskId) -> Result<Task> {
        self.load()?
            .get(id)
            .cloned()
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    /// Replace a task's content wholesale.
    pub fn edit(&self, id: &TaskId, content: &str) -> Result<Task> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::Validation(
                "task content must not be empty".to_string(),
            ));
        }

        let mut list = self.load()?;
        let task = list
            .get_mut(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        task.content = content.to_string();
        let updated = task.clone();
        self.save(&list)?;
        Ok(updated)
    }

    /// Append extra text to a task's content.
    ///
    /// This is the agent-safe alternative to `edit`: it cannot clobber
    /// content written by someone else between read and write.
    pub fn append(&self, id: &TaskId, extra: &str) -> Result<Task> {
        let extra = extra.trim();
        if extra.is_empty() {
            return Err(Error::Validation(
                "appended content must not be empty".to_string(),
            ));
        }

        let mut list = self.load()?;
        let task = list
            .get_mut(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        if task.content.is_empty() {
            task.content = extra.to_string();
        } else {
            task.content.push(' ');
            task.content.push_str(extra);
        }
        let updated = task.clone();
        self.save(&list)?;
        Ok(updated)
    }

    /// Delete a task.
    ///
    /// Refused with `TaskHasDependents` when another task's `after` targets
    /// this id; the dependents must be deleted or re-pointed first.
    pub fn delete(&self, id: &TaskId) -> Result<()> {
        let mut list = self.load()?;
        if list.get(id).is_none() {
            return Err(Error::TaskNotFound(id.to_string()));
        }

        let dependents = list.dependents_of(id);
        if !dependents.is_empty() {
            let names: Vec<String> = dependents.iter().map(|d| d.to_string()).collect();
            return Err(Error::TaskHasDependents {
                id: id.to_string(),
                dependents: names.join(", "),
            });
        }

        rlog_debug!("TaskStore::delete {} on {}", id, self.branch);
        list.tasks.retain(|t| &t.id != id);
        self.save(&list)
    }

    /// Mark a task as done.
    ///
    /// Idempotent: a second call reports `TaskAlreadyDone` and leaves the
    /// stored state untouched.
    pub fn mark_done(&self, id: &TaskId) -> Result<Task> {
        let mut list = self.load()?;
        let task = list
            .get_mut(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;

        if !task.mark_done() {
            return Err(Error::TaskAlreadyDone(id.to_string()));
        }

        rlog_debug!("TaskStore::mark_done {} on {}", id, self.branch);
        let updated = task.clone();
        self.save(&list)?;
        Ok(updated)
    }
}
