//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Creating temporary git repositories
//! - Stub agent scripts standing in for a real backend
//! - Running the ralph binary against a test repository

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use git2::{Repository, Signature};
use tempfile::TempDir;

use ralph::orchestration::Executor;

/// A test repository with a temporary directory and initialized git.
pub struct TestRepo {
    /// The temporary directory containing the repo.
    pub temp_dir: TempDir,
    /// Path to the repository root.
    pub path: PathBuf,
    /// Isolated home directory for binary invocations.
    pub home: TempDir,
}

impl TestRepo {
    /// Create a new test repository with an initial commit.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let home = TempDir::new().expect("Failed to create home directory");
        let path = temp_dir.path().to_path_buf();

        let repo = Repository::init(&path).expect("Failed to init repo");
        let sig = Signature::now("Test User", "test@test.com").unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
            .unwrap();

        Self {
            temp_dir,
            path,
            home,
        }
    }

    /// Write a shell script into the repo's temp dir and return its path.
    pub fn write_script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.path.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");
        path
    }

    /// An executor that runs the given script as the agent. The rendered
    /// prompt arrives as the script's first argument.
    pub fn script_executor(&self, script: &Path) -> Executor {
        let cmd = format!("sh {}", script.display());
        Executor::resolve(None, Some(&cmd)).expect("Failed to resolve script executor")
    }

    /// Run the ralph binary in this repository and capture its output.
    ///
    /// The backend env vars are cleared so ambient configuration can't leak
    /// into the test; set them explicitly via `run_ralph_env`.
    pub fn run_ralph(&self, args: &[&str]) -> Output {
        self.run_ralph_env(args, &[])
    }

    /// Run the ralph binary with extra environment variables.
    pub fn run_ralph_env(&self, args: &[&str], env: &[(&str, &str)]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_ralph"));
        cmd.args(args)
            .current_dir(&self.path)
            // Isolate the binary from the host's ~/.ralph config and log
            .env("HOME", self.home.path())
            .env_remove("RALPH_EXECUTOR")
            .env_remove("RALPH_EXECUTOR_CMD")
            .env_remove("RALPH_DEBUG");
        for (key, value) in env {
            cmd.env(key, value);
        }
        cmd.output().expect("Failed to run ralph binary")
    }
}

/// Stdout of a finished command as a string.
pub fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Stderr of a finished command as a string.
pub fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
