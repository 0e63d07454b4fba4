//! Orchestration layer: dependency resolution, executor invocation
//! building, and the supervisory loop that drives the agent through the
//! backlog.

pub mod executor;
pub mod failure;
pub mod planner;
pub mod prompt;
pub mod resolver;
pub mod runner;

pub use executor::{Executor, Interaction, Invocation, Output};
pub use failure::{FailureTracker, FAILURE_THRESHOLD};
pub use planner::Planner;
pub use runner::{RunOptions, RunOutcome, RunSummary, Runner};
