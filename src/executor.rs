use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::color::ToolArguments;
use crate::error::ToolError;

pub const DEFAULT_TOOL: &str = "redshift";

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn apply(&self, args: &ToolArguments) -> Result<(), ToolError>;
}

#[async_trait]
impl<T: CommandExecutor + ?Sized> CommandExecutor for Box<T> {
    async fn apply(&self, args: &ToolArguments) -> Result<(), ToolError> {
        (**self).apply(args).await
    }
}

/// Runs the gamma-ramp tool as a one-shot subprocess.
pub struct ColorTool {
    name: String,
    timeout: Duration,
}

impl ColorTool {
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            timeout,
        }
    }

    fn locate(&self) -> Result<PathBuf, ToolError> {
        which::which(&self.name).map_err(|_| ToolError::Unavailable(self.name.clone()))
    }

    /// Kills background instances of the tool left over from earlier sessions.
    pub async fn terminate_running(&self) {
        let status = Command::new("killall")
            .arg(&self.name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(s) if s.success() => info!("terminated running {} instances", self.name),
            Ok(_) => debug!("no running {} instances", self.name),
            Err(e) => debug!("killall unavailable: {e}"),
        }
    }
}

#[async_trait]
impl CommandExecutor for ColorTool {
    async fn apply(&self, args: &ToolArguments) -> Result<(), ToolError> {
        let program = self.locate()?;
        let argv = args.to_args();
        debug!("running {} {}", self.name, argv.join(" "));

        let child = Command::new(program)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Invocation {
                tool: self.name.clone(),
                reason: e.to_string(),
            })?;

        // stderr is drained while waiting so a chatty tool cannot block on the pipe
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| ToolError::Invocation {
                tool: self.name.clone(),
                reason: e.to_string(),
            })?,
            Err(_) => {
                return Err(ToolError::Timeout {
                    tool: self.name.clone(),
                    timeout: self.timeout,
                });
            }
        };

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = match stderr.trim() {
            "" => output.status.to_string(),
            msg => format!("{}: {msg}", output.status),
        };
        Err(ToolError::Invocation {
            tool: self.name.clone(),
            reason,
        })
    }
}

/// Logs the command instead of running it.
pub struct DryRun {
    pub tool: String,
}

#[async_trait]
impl CommandExecutor for DryRun {
    async fn apply(&self, args: &ToolArguments) -> Result<(), ToolError> {
        info!("dry run: {} {}", self.tool, args.to_args().join(" "));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ToolArguments {
        ToolArguments {
            temperature_k: 6500,
            brightness_factor: 1.0,
            gamma_rgb: [1.0, 1.0, 1.0],
        }
    }

    #[tokio::test]
    async fn missing_tool_is_unavailable() {
        let tool = ColorTool::new("glasstint-no-such-tool-xyz", Duration::from_secs(1));
        let err = tool.apply(&args()).await.unwrap_err();
        assert!(matches!(err, ToolError::Unavailable(name) if name == "glasstint-no-such-tool-xyz"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_invocation_error() {
        // `false` ignores its arguments and exits 1
        if which::which("false").is_err() {
            return;
        }
        let tool = ColorTool::new("false", Duration::from_secs(2));
        let err = tool.apply(&args()).await.unwrap_err();
        assert!(matches!(err, ToolError::Invocation { .. }));
    }

    #[tokio::test]
    async fn zero_exit_succeeds() {
        if which::which("true").is_err() {
            return;
        }
        let tool = ColorTool::new("true", Duration::from_secs(2));
        tool.apply(&args()).await.unwrap();
    }

    fn script(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn times_out_slow_tool() {
        let dir = tempfile::tempdir().unwrap();
        let slow = script(dir.path(), "slow-tool", "sleep 5");
        let tool = ColorTool::new(slow.to_string_lossy(), Duration::from_millis(200));

        let started = std::time::Instant::now();
        let err = tool.apply(&args()).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout { timeout, .. } if timeout == Duration::from_millis(200)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn stderr_is_reported_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let noisy = script(dir.path(), "noisy-tool", "echo 'bad gamma' >&2\nexit 3");
        let tool = ColorTool::new(noisy.to_string_lossy(), Duration::from_secs(2));
        match tool.apply(&args()).await.unwrap_err() {
            ToolError::Invocation { reason, .. } => assert!(reason.ends_with("bad gamma"), "{reason}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn large_stderr_does_not_stall() {
        let dir = tempfile::tempdir().unwrap();
        // well past a 64 KiB pipe buffer
        let chatty = script(dir.path(), "chatty-tool", "yes x | head -c 262144 >&2");
        let tool = ColorTool::new(chatty.to_string_lossy(), Duration::from_secs(3));
        tool.apply(&args()).await.unwrap();
    }

    #[tokio::test]
    async fn terminate_running_without_matches_returns() {
        let tool = ColorTool::new("glasstint-no-such-tool-xyz", Duration::from_secs(1));
        tool.terminate_running().await;
    }

    #[tokio::test]
    async fn dry_run_always_succeeds() {
        let dry = DryRun {
            tool: DEFAULT_TOOL.to_string(),
        };
        dry.apply(&args()).await.unwrap();
    }
}
