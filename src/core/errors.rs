use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecError {
    pub tool: String,
    pub args: Vec<String>,
    pub cwd: String,
    pub exit_code: Option<i32>,
    pub stderr_tail: String,
    pub duration_ms: u128,
    /// Killed after exceeding its time limit.
    #[serde(default)]
    pub timed_out: bool,
}

#[derive(Error, Debug)]
pub enum HawkeyeError {
    #[error("execution failed: {} exited with {:?}: {}", .0.tool, .0.exit_code, .0.stderr_tail)]
    Exec(ExecError),

    #[error("tool not found in PATH: {0}")]
    ToolMissing(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("stage {stage} unavailable: {reason}")]
    StageUnavailable { stage: String, reason: String },

    #[error("cannot prepare output directory {path:?}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("interrupted by operator")]
    Interrupted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HawkeyeError {
    /// Short machine-readable reason recorded in tool outcomes.
    pub fn reason(&self) -> &'static str {
        match self {
            HawkeyeError::Exec(e) if e.timed_out => "timeout",
            HawkeyeError::Exec(_) => "non_zero_exit",
            HawkeyeError::ToolMissing(_) => "tool_not_found",
            HawkeyeError::Config(_) => "config",
            HawkeyeError::StageUnavailable { .. } => "stage_unavailable",
            HawkeyeError::OutputDir { .. } => "output_dir",
            HawkeyeError::Interrupted => "interrupted",
            HawkeyeError::Io(_) => "io",
        }
    }
}
