//! Integration test suite for ralph.
//!
//! These tests exercise the task store through the real git object
//! database, the CLI surface the external agent calls back into, and the
//! supervisory loop end to end with stub agent scripts standing in for a
//! real backend.
//!
//! # Test Categories
//!
//! - `task_cli`: the task CRUD collaborator interface, human and JSON modes
//! - `run_loop`: sequential selection, circuit breaking, stop conditions
//! - `parallel`: bounded concurrent children and straggler termination
//!
//! # CI Compatibility
//!
//! No real agent backend is invoked; stub shell scripts play that role, so
//! the suite is safe to run anywhere with `sh` and `git` object support.

mod fixtures;

mod run_loop;
mod task_cli;
