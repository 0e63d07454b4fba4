use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not on a branch (detached HEAD)")]
    NotOnBranch,

    #[error("Branch name too long for task ref: {0}")]
    BranchNameTooLong(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task already done: {0}")]
    TaskAlreadyDone(String),

    #[error("Task {id} has dependents: {dependents}")]
    TaskHasDependents { id: String, dependents: String },

    #[error("Invalid executor: {0} (expected \"claude\" or \"codex\")")]
    InvalidExecutor(String),

    #[error("Agent process failed: {0}")]
    Agent(String),
}

pub type Result<T> = std::result::Result<T, Error>;
