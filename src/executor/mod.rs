//! # Execution Layer
//!
//! Runs synthesized resources and the subprocesses they wrap.
//!
//! ## Core Components
//!
//! - **[`CommandRunner`]**: async seam for subprocess execution
//! - **[`HostExecutor`]**: `tokio::process` implementation with timeouts and stdin piping
//! - **[`SafetyScanner`]**: static deny-list scan of text payloads
//! - **[`HandlerRegistry`]**: closed set of named capability handlers that serve
//!   `function` and `class-like` resources
//! - **[`DynamicExecutor`]**: dispatches a resource by implementation shape, times
//!   every call and keeps an execution history
//!
//! ## Dispatch
//!
//! ```text
//! SynthesizedResource
//!        ↓
//!   DynamicExecutor::execute()
//!        ↓
//!   ┌────────────┬──────────────────┬─────────────┐
//!   │            │                  │             │
//! function   class-like     command-wrapper  api-wrapper
//!   │            │                  │             │
//!   └─ scan ─────┘                  ↓             ↓
//!        ↓                     HostExecutor    reqwest
//!  HandlerRegistry
//! ```
//!
//! Text payloads are scanned and then routed to a registered handler by their entry
//! name. They are never compiled or interpreted, and the scan is not a sandbox.

use crate::error::{ErrorKind, ForgeError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub mod api;
pub mod dynamic;
pub mod handlers;
pub mod host;
pub mod safety;

pub use dynamic::{DynamicExecutor, ExecutionHistoryEntry, ExecutionOutcome, ExecutionStatistics, InvocationContext};
pub use handlers::{CapabilityHandler, HandlerRegistry, PassthroughHandler, RequireParamsHandler};
pub use host::HostExecutor;
pub use safety::{SafetyMatch, SafetyReport, SafetyScanner};

/// Result of command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (0 = success, -1 when terminated by a signal)
    pub exit_code: i32,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Command to execute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub stdin: Option<String>,
    /// Maximum execution time (None = no timeout)
    pub timeout: Option<Duration>,
}

impl ExecutionCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            env: HashMap::new(),
            stdin: None,
            timeout: None,
        }
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Program and arguments joined for log lines
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Errors during command execution
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Program not found: {0}")]
    ProgramNotFound(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<ExecutorError> for ForgeError {
    fn from(error: ExecutorError) -> Self {
        match error {
            ExecutorError::Timeout(limit) => ForgeError::timeout("command", limit, limit),
            ExecutorError::ProgramNotFound(program) => {
                ForgeError::new(ErrorKind::ResourceExecution, format!("program '{}' not found", program))
                    .with_context("program", program)
            }
            other => ForgeError::new(ErrorKind::ResourceExecution, other.to_string()),
        }
    }
}

/// Seam for running subprocesses, so callers can substitute a fake in tests
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(&self, command: ExecutionCommand) -> Result<ExecutionResult, ExecutorError>;

    async fn health_check(&self) -> Result<(), ExecutorError> {
        Ok(())
    }

    fn executor_type(&self) -> &'static str;
}
