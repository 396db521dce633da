use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::command::{self, CommandResult};
use super::toolchain;
use crate::core::errors::HawkeyeError;

/// One invocation of an external binary.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub tool: &'static str,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl ToolCommand {
    pub fn new(tool: &'static str) -> Self {
        Self {
            tool,
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, flag: &str, path: &Path) -> Self {
        self.arg(flag).arg(path.display().to_string())
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ToolRunner {
    default_timeout: Duration,
}

impl ToolRunner {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn is_installed(&self, tool: &str) -> bool {
        toolchain::is_installed(tool)
    }

    pub async fn run(&self, cmd: &ToolCommand, cwd: &Path) -> Result<CommandResult, HawkeyeError> {
        if !self.is_installed(cmd.tool) {
            tracing::error!("{} is not installed", cmd.tool);
            return Err(HawkeyeError::ToolMissing(cmd.tool.to_string()));
        }

        tracing::info!("Running: {}", cmd.tool);
        let timeout = cmd.timeout.unwrap_or(self.default_timeout);
        match command::execute(cmd.tool, &cmd.args, cwd, Some(timeout)).await {
            Ok(result) => {
                tracing::info!("{} completed successfully ({} ms)", cmd.tool, result.duration_ms);
                tracing::debug!(
                    "{} exited with {}, {} bytes stdout, {} bytes stderr",
                    cmd.tool,
                    result.exit_code,
                    result.stdout.len(),
                    result.stderr.len()
                );
                Ok(result)
            }
            Err(e) => {
                tracing::warn!("{} failed: {}", cmd.tool, e);
                Err(e)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Failed,
    Skipped,
}

/// Per-tool record stored in a stage payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutcome {
    pub tool: String,
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,
    pub count: usize,
    pub duration_ms: u128,
}

impl ToolOutcome {
    pub fn succeeded(tool: &str, run: &CommandResult, output_file: Option<PathBuf>, count: usize) -> Self {
        Self {
            tool: tool.to_string(),
            status: ToolStatus::Success,
            reason: None,
            output_file,
            count,
            duration_ms: run.duration_ms,
        }
    }

    pub fn failed(tool: &str, error: &HawkeyeError) -> Self {
        let duration_ms = match error {
            HawkeyeError::Exec(e) => e.duration_ms,
            _ => 0,
        };
        Self {
            tool: tool.to_string(),
            status: ToolStatus::Failed,
            reason: Some(error.reason().to_string()),
            output_file: None,
            count: 0,
            duration_ms,
        }
    }

    pub fn skipped(tool: &str, reason: &str) -> Self {
        Self {
            tool: tool.to_string(),
            status: ToolStatus::Skipped,
            reason: Some(reason.to_string()),
            output_file: None,
            count: 0,
            duration_ms: 0,
        }
    }

    /// The unit running this tool died without producing an outcome.
    pub fn aborted(tool: &str) -> Self {
        Self {
            tool: tool.to_string(),
            status: ToolStatus::Failed,
            reason: Some("aborted".to_string()),
            output_file: None,
            count: 0,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = ToolCommand::new("subfinder")
            .arg("-d")
            .arg("example.com")
            .path_arg("-o", Path::new("/tmp/out.txt"))
            .args(["-silent"])
            .timeout(Duration::from_secs(5));
        assert_eq!(cmd.args, vec!["-d", "example.com", "-o", "/tmp/out.txt", "-silent"]);
        assert_eq!(cmd.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_failed_outcome_serializes_reason() {
        let outcome = ToolOutcome::failed("nuclei", &HawkeyeError::ToolMissing("nuclei".into()));
        let value = outcome.to_value();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["reason"], "tool_not_found");
        assert!(value.get("output_file").is_none());
    }

    #[tokio::test]
    async fn test_runner_reports_missing_tool() {
        let runner = ToolRunner::new(Duration::from_secs(1));
        let err = runner
            .run(&ToolCommand::new("hawkeye-no-such-tool"), &std::env::temp_dir())
            .await
            .unwrap_err();
        assert!(matches!(err, HawkeyeError::ToolMissing(_)));
    }
}
