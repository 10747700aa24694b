// src/exec/command.rs

//! Shell-command task bodies.

use std::process::Stdio;

use anyhow::{anyhow, Context};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::flow::task::{TaskContext, TaskError};

/// A task body that runs one shell command per attempt.
///
/// - A non-zero exit is a retryable failure.
/// - Failing to spawn the process is fatal; retrying would not help.
/// - If the run is cancelled while the command is running, the child is
///   killed and the attempt fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTask {
    cmd: String,
}

impl CommandTask {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    /// Run a single attempt.
    pub async fn run<C>(&self, ctx: &TaskContext<C>) -> Result<(), TaskError> {
        info!(
            task = %ctx.task,
            attempt = ctx.attempt,
            cmd = %self.cmd,
            "starting task process"
        );

        // Build a shell command appropriate for the platform.
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        cmd.stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for task '{}'", ctx.task))
            .map_err(TaskError::fatal)?;

        // Always consume stderr so buffers don't fill; log at debug.
        if let Some(stderr) = child.stderr.take() {
            let task_name = ctx.task.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(task = %task_name, "stderr: {}", line);
                }
            });
        }

        tokio::select! {
            status_res = child.wait() => {
                let status = status_res
                    .with_context(|| format!("waiting for process of task '{}'", ctx.task))?;
                let code = status.code().unwrap_or(-1);

                info!(
                    task = %ctx.task,
                    exit_code = code,
                    success = status.success(),
                    "task process exited"
                );

                if status.success() {
                    Ok(())
                } else {
                    Err(TaskError::retryable(anyhow!("command `{}` exited with code {code}", self.cmd))
                        .with_description(format!("exit code {code}")))
                }
            }

            _ = ctx.cancel.cancelled() => {
                info!(task = %ctx.task, "run cancelled; killing task process");
                if let Err(e) = child.kill().await {
                    warn!(task = %ctx.task, error = %e, "failed to kill child process on cancellation");
                }
                Err(TaskError::retryable(anyhow!("command `{}` killed on cancellation", self.cmd)))
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn ctx(cancel: CancellationToken) -> TaskContext<()> {
        TaskContext {
            data: Arc::new(()),
            task: "cmd".to_string(),
            attempt: 1,
            cancel,
        }
    }

    #[tokio::test]
    async fn zero_exit_succeeds() {
        let task = CommandTask::new("true");
        assert!(task.run(&ctx(CancellationToken::new())).await.is_ok());
    }

    #[tokio::test]
    async fn non_zero_exit_is_retryable() {
        let task = CommandTask::new("exit 3");
        let err = task.run(&ctx(CancellationToken::new())).await.unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(err.description(), Some("exit code 3"));
    }

    #[tokio::test]
    async fn cancellation_kills_long_running_command() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let task = CommandTask::new("sleep 30");
        let started = std::time::Instant::now();
        let res = task.run(&ctx(cancel)).await;

        assert!(res.is_err());
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
