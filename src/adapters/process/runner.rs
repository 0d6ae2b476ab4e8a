//! Process-based agent runner.
//!
//! Executes an agent's unit of work as a child process and races it against
//! the attempt deadline. The child is placed in its own process group so that
//! a timeout or shutdown kills the whole tree, not just the interpreter.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::sleep;

use crate::domain::models::AgentCommand;
use crate::domain::ports::{AgentOutcome, AgentRunner};

/// Maximum bytes of stdout/stderr retained per attempt.
const OUTPUT_TAIL_BYTES: usize = 8 * 1024;

pub struct ProcessAgentRunner;

impl ProcessAgentRunner {
    pub fn new() -> Self {
        Self
    }

    fn build_command(command: &AgentCommand) -> Command {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = command.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    /// Kill the child's process group, then reap the child.
    async fn terminate(child: &mut Child) {
        if let Some(pid) = child.id() {
            #[cfg(unix)]
            if let Err(err) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                tracing::warn!(pid, error = %err, "failed to kill agent process group");
            }
        }
        let _ = child.kill().await;
        let _ = child.wait().await;
    }
}

impl Default for ProcessAgentRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentRunner for ProcessAgentRunner {
    async fn run(
        &self,
        command: &AgentCommand,
        timeout: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> AgentOutcome {
        let mut child = match Self::build_command(command).spawn() {
            Ok(child) => child,
            Err(err) => {
                return AgentOutcome::Failure {
                    message: format!("failed to spawn {}: {err}", command.program),
                };
            }
        };

        // Drain stdout/stderr concurrently so the child never blocks on a
        // full pipe while we wait on it.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = tokio::spawn(read_to_tail(stdout));
        let stderr_task = tokio::spawn(read_to_tail(stderr));

        let status = tokio::select! {
            status = child.wait() => status,
            () = sleep(timeout) => {
                Self::terminate(&mut child).await;
                stdout_task.abort();
                stderr_task.abort();
                return AgentOutcome::TimedOut;
            }
            _ = shutdown.changed() => {
                Self::terminate(&mut child).await;
                stdout_task.abort();
                stderr_task.abort();
                return AgentOutcome::Cancelled;
            }
        };

        let stdout_tail = stdout_task.await.unwrap_or_default();
        let stderr_tail = stderr_task.await.unwrap_or_default();

        match status {
            Ok(status) if status.success() => {
                if !stderr_tail.is_empty() {
                    tracing::warn!(command = %command, stderr = %stderr_tail, "agent wrote to stderr");
                }
                AgentOutcome::Success { output: stdout_tail }
            }
            Ok(status) => {
                let code = status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string());
                let message = if stderr_tail.is_empty() {
                    format!("agent exited with code {code}")
                } else {
                    format!("agent exited with code {code}: {stderr_tail}")
                };
                AgentOutcome::Failure { message }
            }
            Err(err) => AgentOutcome::Failure {
                message: format!("failed to wait on agent process: {err}"),
            },
        }
    }
}

/// Read a pipe to completion, keeping only the last `OUTPUT_TAIL_BYTES`.
async fn read_to_tail<R>(reader: Option<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let Some(mut reader) = reader else {
        return String::new();
    };

    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > OUTPUT_TAIL_BYTES {
                    let excess = buffer.len() - OUTPUT_TAIL_BYTES;
                    buffer.drain(..excess);
                }
            }
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&buffer).trim().to_string()
}
