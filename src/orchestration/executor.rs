//! Agent backend selection and invocation building.
//!
//! The executor is resolved exactly once at startup into a closed variant:
//! one of the built-in backends, or a fully custom command line. Two
//! independent axes then shape the argument vector: headless vs interactive
//! (whether the backend's non-interactive flag is appended) and streamed vs
//! buffered (whether its structured-streaming flag is appended). The
//! rendered task prompt is always the final argument.

use crate::{Error, Result};

/// Environment variable naming a built-in backend.
pub const EXECUTOR_ENV: &str = "RALPH_EXECUTOR";

/// Environment variable carrying a full custom command line. When set it
/// bypasses backend name validation entirely.
pub const EXECUTOR_CMD_ENV: &str = "RALPH_EXECUTOR_CMD";

/// How the child interacts with the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    /// Append the backend's non-interactive flag; the child runs to
    /// completion without prompting.
    Headless,
    /// Omit the flag so the child can converse on inherited stdio.
    Interactive,
}

/// How the child's output is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// Capture stdout/stderr in memory; surfaced only on failure.
    Buffered,
    /// Append the backend's structured-streaming flag; the caller redirects
    /// stdout to a per-task log file.
    Streamed,
}

/// The resolved agent backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Executor {
    /// Claude Code CLI.
    Claude,
    /// Codex CLI.
    Codex,
    /// User-supplied command line, split on whitespace. No quoting support;
    /// arguments containing spaces cannot be expressed.
    Custom(Vec<String>),
}

/// A fully built child process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Render for dry-run display and logging. Purely informational; the
    /// naive join does not round-trip through a shell.
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

impl Executor {
    /// Resolve the executor from an optional backend name and an optional
    /// custom override. Called once at startup; commands never re-dispatch
    /// on strings afterwards.
    ///
    /// # Errors
    /// Returns `InvalidExecutor` for an unrecognized name, unless an
    /// override is present (the override wins and skips name validation).
    pub fn resolve(name: Option<&str>, override_cmd: Option<&str>) -> Result<Self> {
        if let Some(cmd) = override_cmd {
            let tokens: Vec<String> = cmd.split_whitespace().map(String::from).collect();
            if tokens.is_empty() {
                return Err(Error::Validation(
                    "custom executor command is empty".to_string(),
                ));
            }
            return Ok(Executor::Custom(tokens));
        }

        match name {
            None | Some("claude") => Ok(Executor::Claude),
            Some("codex") => Ok(Executor::Codex),
            Some(other) => Err(Error::InvalidExecutor(other.to_string())),
        }
    }

    /// Resolve from the process environment, falling back to a configured
    /// backend name. Precedence: override env > name env > config.
    pub fn from_env(config_name: Option<&str>) -> Result<Self> {
        let override_cmd = std::env::var(EXECUTOR_CMD_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty());
        let name = std::env::var(EXECUTOR_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty());

        Self::resolve(
            name.as_deref().or(config_name),
            override_cmd.as_deref(),
        )
    }

    /// The program that will be spawned.
    pub fn program(&self) -> &str {
        match self {
            Executor::Claude => "claude",
            Executor::Codex => "codex",
            Executor::Custom(tokens) => &tokens[0],
        }
    }

    /// True for backends whose binary can be preflight-checked by name.
    pub fn is_builtin(&self) -> bool {
        !matches!(self, Executor::Custom(_))
    }

    fn non_interactive_args(&self) -> &'static [&'static str] {
        match self {
            Executor::Claude => &["-p"],
            Executor::Codex => &["exec"],
            Executor::Custom(_) => &[],
        }
    }

    fn stream_args(&self) -> &'static [&'static str] {
        match self {
            Executor::Claude => &["--output-format", "stream-json", "--verbose"],
            Executor::Codex => &["--json"],
            Executor::Custom(_) => &[],
        }
    }

    fn model_flag(&self) -> Option<&'static str> {
        match self {
            Executor::Claude => Some("--model"),
            Executor::Codex => Some("-m"),
            Executor::Custom(_) => None,
        }
    }

    /// Build the argument vector for one agent invocation.
    ///
    /// For custom commands the supplied tokens are taken verbatim and only
    /// the prompt is appended; the backend axes and model don't apply since
    /// the command line is already fully specified by the user.
    pub fn invocation(
        &self,
        prompt: &str,
        interaction: Interaction,
        output: Output,
        model: Option<&str>,
    ) -> Invocation {
        let mut args: Vec<String> = match self {
            Executor::Custom(tokens) => tokens[1..].to_vec(),
            _ => Vec::new(),
        };

        if interaction == Interaction::Headless {
            args.extend(self.non_interactive_args().iter().map(|s| s.to_string()));
        }
        if output == Output::Streamed {
            args.extend(self.stream_args().iter().map(|s| s.to_string()));
        }
        if let (Some(flag), Some(model)) = (self.model_flag(), model) {
            args.push(flag.to_string());
            args.push(model.to_string());
        }

        // The prompt is always the final argument
        args.push(prompt.to_string());

        Invocation {
            program: self.program().to_string(),
            args,
        }
    }
}
