//! Git object database access for task persistence.
//!
//! The task list for each branch is stored as a single blob in the host
//! repository's object database, pointed at by a ref under
//! `refs/ralph/tasks/`. This module provides the three primitives the task
//! store is built on: write a blob, read the blob a branch's ref targets,
//! and atomically repoint that ref.

use std::path::{Path, PathBuf};

use git2::{ErrorCode, Oid, Repository};

use crate::{rlog_debug, Error, Result};

/// The namespace prefix for per-branch task refs.
const TASKS_REF_PREFIX: &str = "refs/ralph/tasks/";

/// Maximum length of a full ref name. Branch names that would push the ref
/// past this are rejected outright rather than silently truncated.
const MAX_REF_LEN: usize = 250;

/// Adapter over the host repository's content-addressable store.
pub struct ObjectStore {
    repo_path: PathBuf,
}

impl ObjectStore {
    /// Create a new ObjectStore for the repository containing `path`.
    ///
    /// # Errors
    /// Returns an error if the path is not inside a git repository.
    pub fn discover(path: &Path) -> Result<Self> {
        rlog_debug!("ObjectStore::discover path={}", path.display());
        let _ = Repository::discover(path)?;
        Ok(Self {
            repo_path: path.to_path_buf(),
        })
    }

    /// Get a fresh Repository handle.
    fn repo(&self) -> Result<Repository> {
        Ok(Repository::discover(&self.repo_path)?)
    }

    /// The repository working directory (repo path for bare repositories).
    pub fn workdir(&self) -> Result<PathBuf> {
        let repo = self.repo()?;
        Ok(repo
            .workdir()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| repo.path().to_path_buf()))
    }

    /// Name of the currently checked-out branch.
    ///
    /// Resolved from the symbolic target of HEAD, which also works on an
    /// unborn branch (fresh repository with no commits).
    ///
    /// # Errors
    /// Returns `Error::NotOnBranch` when HEAD is detached.
    pub fn current_branch(&self) -> Result<String> {
        let repo = self.repo()?;
        let head = repo.find_reference("HEAD")?;
        match head.symbolic_target() {
            Some(target) => {
                let branch = target.strip_prefix("refs/heads/").unwrap_or(target);
                rlog_debug!("Current branch: {}", branch);
                Ok(branch.to_string())
            }
            None => Err(Error::NotOnBranch),
        }
    }

    /// Build the full task ref name for a branch.
    ///
    /// # Errors
    /// Returns `Error::BranchNameTooLong` if the full ref name would exceed
    /// the maximum ref length.
    pub fn tasks_ref(branch: &str) -> Result<String> {
        let refname = format!("{}{}", TASKS_REF_PREFIX, branch);
        if refname.len() > MAX_REF_LEN {
            return Err(Error::BranchNameTooLong(branch.to_string()));
        }
        Ok(refname)
    }

    /// Write bytes as a new blob in the object database.
    ///
    /// Returns the blob's object id. The blob is immutable and unreferenced
    /// until `update_ref` points the branch's task ref at it.
    pub fn write_blob(&self, bytes: &[u8]) -> Result<String> {
        let repo = self.repo()?;
        let oid = repo.blob(bytes)?;
        rlog_debug!("Wrote blob {} ({} bytes)", oid, bytes.len());
        Ok(oid.to_string())
    }

    /// Read the blob contents the branch's task ref points at.
    ///
    /// Returns `None` if the ref doesn't exist, which means "no tasks yet".
    pub fn read_ref(&self, branch: &str) -> Result<Option<Vec<u8>>> {
        let repo = self.repo()?;
        let refname = Self::tasks_ref(branch)?;

        let oid = match repo.find_reference(&refname) {
            Ok(reference) => match reference.target() {
                Some(oid) => oid,
                None => return Ok(None),
            },
            Err(e) if e.code() == ErrorCode::NotFound => {
                rlog_debug!("Ref {} not found", refname);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let blob = repo.find_blob(oid)?;
        rlog_debug!("Read ref {} -> {} ({} bytes)", refname, oid, blob.size());
        Ok(Some(blob.content().to_vec()))
    }

    /// Atomically point the branch's task ref at a blob, creating the ref if
    /// it doesn't exist yet.
    ///
    /// This repoint is the only write boundary; readers observe either the
    /// old blob or the new one, never a partial write.
    pub fn update_ref(&self, branch: &str, blob_id: &str) -> Result<()> {
        rlog_debug!("ObjectStore::update_ref branch={} blob={}", branch, blob_id);
        let repo = self.repo()?;
        let refname = Self::tasks_ref(branch)?;
        let oid = Oid::from_str(blob_id)?;
        repo.reference(&refname, oid, true, "ralph: update tasks")?;
        Ok(())
    }
}
