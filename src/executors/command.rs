use crate::core::errors::{ExecError, HawkeyeError};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u128,
}

pub async fn execute(
    tool: &str,
    args: &[String],
    cwd: &Path,
    timeout_duration: Option<Duration>,
) -> Result<CommandResult, HawkeyeError> {
    let start = Instant::now();

    tracing::debug!("Executing: {} {:?} in {:?}", tool, args, cwd);

    let exec_error = |exit_code: Option<i32>, stderr_tail: String, duration_ms: u128| {
        ExecError {
            tool: tool.to_string(),
            args: args.to_vec(),
            cwd: cwd.display().to_string(),
            exit_code,
            stderr_tail,
            duration_ms,
            timed_out: false,
        }
    };

    let mut cmd = Command::new(tool);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(HawkeyeError::ToolMissing(tool.to_string()));
        }
        Err(e) => {
            return Err(HawkeyeError::Exec(exec_error(None, format!("Failed to spawn: {}", e), 0)));
        }
    };

    let (Some(stdout_handle), Some(stderr_handle)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(HawkeyeError::Exec(exec_error(None, "Failed to capture process output".to_string(), 0)));
    };

    // Read outputs incrementally to avoid buffer stalls. The limit covers the
    // readers too, since a hung tool keeps its pipes open.
    let run = async {
        tokio::join!(
            read_lines(BufReader::new(stdout_handle)),
            read_lines(BufReader::new(stderr_handle)),
            child.wait()
        )
    };
    let joined = match timeout_duration {
        Some(duration) => timeout(duration, run).await,
        None => Ok(run.await),
    };

    let duration_ms = start.elapsed().as_millis();

    let Ok((stdout_result, stderr_result, wait_result)) = joined else {
        let _ = child.kill().await;
        let limit = timeout_duration.map(|d| d.as_millis()).unwrap_or_default();
        return Err(HawkeyeError::Exec(ExecError {
            timed_out: true,
            ..exec_error(None, format!("Command timed out after {}ms", limit), duration_ms)
        }));
    };

    let status = match wait_result {
        Ok(status) => status,
        Err(e) => {
            return Err(HawkeyeError::Exec(exec_error(None, format!("Process error: {}", e), duration_ms)));
        }
    };

    let exit_code = status.code().unwrap_or(-1);
    let stdout = stdout_result?;
    let stderr = stderr_result?;

    if !status.success() {
        return Err(HawkeyeError::Exec(exec_error(Some(exit_code), tail(&stderr, 10), duration_ms)));
    }

    Ok(CommandResult {
        stdout,
        stderr,
        exit_code,
        duration_ms,
    })
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

async fn read_lines<R>(reader: BufReader<R>) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = Vec::new();
    let mut reader = reader.lines();

    while let Some(line) = reader.next_line().await? {
        lines.push(line);
    }

    Ok(lines.join("\n"))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_successful_command() {
        let dir = std::env::temp_dir();
        let result = execute("echo", &args(&["hello"]), &dir, None).await.unwrap();
        assert_eq!(result.stdout, "hello");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let dir = std::env::temp_dir();
        let err = execute("sh", &args(&["-c", "echo oops >&2; exit 3"]), &dir, None)
            .await
            .unwrap_err();
        match err {
            HawkeyeError::Exec(e) => {
                assert_eq!(e.exit_code, Some(3));
                assert_eq!(e.stderr_tail, "oops");
                assert!(!e.timed_out);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let dir = std::env::temp_dir();
        let err = execute("hawkeye-no-such-tool", &[], &dir, None).await.unwrap_err();
        assert!(matches!(err, HawkeyeError::ToolMissing(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = std::env::temp_dir();
        let err = execute("sleep", &args(&["5"]), &dir, Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "timeout");
        assert!(matches!(err, HawkeyeError::Exec(ref e) if e.timed_out && e.exit_code.is_none()));
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\nb\nc", 2), "b\nc");
        assert_eq!(tail("a", 5), "a");
    }
}
