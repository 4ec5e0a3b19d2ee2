//! Native host command execution.
//!
//! Executes commands directly on the host system using `tokio::process::Command`.

use super::{CommandRunner, ExecutionCommand, ExecutionResult, ExecutorError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Executes commands directly on the host system
#[derive(Debug, Clone, Default)]
pub struct HostExecutor;

impl HostExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for HostExecutor {
    async fn execute(&self, cmd: ExecutionCommand) -> Result<ExecutionResult, ExecutorError> {
        debug!("Executing command on host: {}", cmd.display());

        let start = Instant::now();

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if cmd.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            // a timed-out wait drops the child; make sure the process goes with it
            .kill_on_drop(true);

        if let Some(ref dir) = cmd.working_dir {
            command.current_dir(dir);
        }

        for (key, value) in &cmd.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ExecutorError::ProgramNotFound(cmd.program.clone()),
            _ => ExecutorError::IoError(e),
        })?;

        if let (Some(input), Some(mut stdin)) = (cmd.stdin.as_ref(), child.stdin.take()) {
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                warn!("Failed to write stdin for {}: {}", cmd.program, e);
            }
            drop(stdin);
        }

        let output = if let Some(timeout) = cmd.timeout {
            match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!("Command {} timed out after {:?}", cmd.program, timeout);
                    return Err(ExecutorError::Timeout(timeout));
                }
            }
        } else {
            child.wait_with_output().await?
        };

        let duration = start.elapsed();
        let exit_code = output.status.code().unwrap_or(-1);
        debug!("Command {} exited with {} in {:?}", cmd.program, exit_code, duration);

        Ok(ExecutionResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code,
            duration,
        })
    }

    fn executor_type(&self) -> &'static str {
        "host"
    }
}
