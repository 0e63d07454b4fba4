//! Prompt rendering for agent invocations.

use crate::store::task::Task;

/// Render the prompt handed to the agent for one task.
///
/// The agent owns task completion: it must call `ralph task done` itself.
/// The orchestrator only observes the exit status, so a task the agent
/// never marks done will simply be selected again.
pub fn task_prompt(task: &Task) -> String {
    format!(
        "You are working on {id} from the ralph backlog of this repository.\n\
         \n\
         Task: {content}\n\
         \n\
         Instructions:\n\
         - Work on this task only. Commit your changes when they build and tests pass.\n\
         - When the task is fully complete, run: ralph task done {id}\n\
         - If you find follow-up work, record it with: ralph task add \"<description>\" \
         (add --after {id} if it must wait for this task).\n\
         - If you cannot finish, stop without marking the task done; it will be retried.\n",
        id = task.id,
        content = task.content,
    )
}

/// Render the prompt for a planning session.
pub fn plan_prompt(description: Option<&str>) -> String {
    let goal = match description {
        Some(d) => format!("Goal: {}\n", d),
        None => "Goal: inspect this repository and propose the next round of work.\n".to_string(),
    };

    format!(
        "Plan work for this repository by breaking the goal below into small, \
         independently completable tasks.\n\
         \n\
         {goal}\
         \n\
         Instructions:\n\
         - Record each task with: ralph task add \"<description>\"\n\
         - If a task depends on another, add it with: ralph task add \"<description>\" --after <task-id>\n\
         - Review the existing backlog first with: ralph task list\n\
         - Keep each task completable in a single focused session.\n\
         - Do not start implementing; only create the tasks.\n",
    )
}
