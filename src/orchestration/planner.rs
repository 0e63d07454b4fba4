//! Interactive planning sessions.
//!
//! `plan` hands the goal to the agent in an interactive session and asks it
//! to decompose the work into backlog entries via `ralph task add`. The
//! session runs on inherited stdio so the user can steer it.

use std::process::Command;

use crate::orchestration::executor::{Executor, Interaction, Output};
use crate::orchestration::prompt;
use crate::store::TaskStore;
use crate::{rlog, Error, Result};

pub struct Planner {
    executor: Executor,
    model: Option<String>,
    dry_run: bool,
}

impl Planner {
    pub fn new(executor: Executor, model: Option<String>, dry_run: bool) -> Self {
        Self {
            executor,
            model,
            dry_run,
        }
    }

    /// Run one planning session against the store's repository.
    pub fn plan(&self, store: &TaskStore, description: Option<&str>) -> Result<()> {
        let rendered = prompt::plan_prompt(description);
        let invocation = self.executor.invocation(
            &rendered,
            Interaction::Interactive,
            Output::Buffered,
            self.model.as_deref(),
        );

        if self.dry_run {
            println!("[dry-run] {}", invocation.command_line());
            return Ok(());
        }

        let before = store.list()?.len();
        rlog!("Planning session starting via {}", invocation.program);

        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(store.workdir()?)
            .status()
            .map_err(|e| {
                Error::Agent(format!("failed to spawn {}: {}", invocation.program, e))
            })?;

        if !status.success() {
            return Err(Error::Agent(format!(
                "planning session exited with {}",
                status.code().map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string())
            )));
        }

        let after = store.list()?.len();
        if after > before {
            println!("Planned {} new task(s). Review with: ralph task list", after - before);
        } else {
            println!("Planning session added no tasks.");
        }
        Ok(())
    }
}
