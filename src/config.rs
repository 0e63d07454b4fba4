use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{rlog_debug, Error, Result};

/// User-level defaults for `run` and `plan`, loaded from `~/.ralph/ralph.toml`.
///
/// Every field is optional; CLI flags and environment variables take
/// precedence over anything configured here.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Named executor backend ("claude" or "codex").
    pub executor: Option<String>,
    /// Model passed through to the executor backend.
    pub model: Option<String>,
    /// Seconds to sleep between orchestrator iterations.
    pub delay_secs: Option<u64>,
    /// Default number of concurrent agent processes for `run --parallel`.
    pub parallel: Option<usize>,
}

impl Config {
    pub fn ralph_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".ralph"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::ralph_dir()?.join("ralph.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        rlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            rlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        rlog_debug!(
            "Config loaded: executor={:?}, model={:?}, delay_secs={:?}, parallel={:?}",
            config.executor,
            config.model,
            config.delay_secs,
            config.parallel
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let ralph_dir = Self::ralph_dir()?;
        rlog_debug!("Config::save ralph_dir={}", ralph_dir.display());
        if !ralph_dir.exists() {
            fs::create_dir_all(&ralph_dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        rlog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}

/// Per-repository directory holding per-task log files.
///
/// Created lazily by the orchestrator on first dispatch.
pub fn logs_dir(workdir: &Path) -> PathBuf {
    workdir.join(".ralph").join("logs")
}
