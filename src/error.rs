//! Structured error taxonomy shared by every subsystem.
//!
//! Every failure the engine surfaces is a [`ForgeError`]: a stable machine-readable
//! code, a key/value context naming the identifiers and stage involved, a
//! recoverability flag consulted by the retry layer, and the time it was raised.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Convenience alias used across the crate
pub type ForgeResult<T> = Result<T, ForgeError>;

/// Failure families, one per engine layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Analysis,
    Synthesis,
    Assignment,
    Execution,
    Timeout,
}

/// Specific failure kinds with their stable codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ComplexityCalculation,
    CapabilityDetection,
    StrategyDetermination,
    InvalidResourceKind,
    CodeGeneration,
    ResourceExecution,
    UnsafeResource,
    NoMatchingTemplate,
    InstanceCreation,
    ConcurrencyLimit,
    InstanceNotFound,
    TemplateExecution,
    HookFailure,
    ResourceExhausted,
    Timeout,
}

impl ErrorKind {
    /// Stable code, safe to branch on
    pub fn code(&self) -> &'static str {
        match self {
            Self::ComplexityCalculation => "ANALYSIS_COMPLEXITY_FAILED",
            Self::CapabilityDetection => "ANALYSIS_CAPABILITY_FAILED",
            Self::StrategyDetermination => "ANALYSIS_STRATEGY_FAILED",
            Self::InvalidResourceKind => "SYNTHESIS_INVALID_KIND",
            Self::CodeGeneration => "SYNTHESIS_CODEGEN_FAILED",
            Self::ResourceExecution => "SYNTHESIS_EXECUTION_FAILED",
            Self::UnsafeResource => "SYNTHESIS_UNSAFE_CODE",
            Self::NoMatchingTemplate => "ASSIGNMENT_NO_TEMPLATE",
            Self::InstanceCreation => "ASSIGNMENT_INSTANCE_CREATION_FAILED",
            Self::ConcurrencyLimit => "ASSIGNMENT_CONCURRENCY_LIMIT",
            Self::InstanceNotFound => "ASSIGNMENT_INSTANCE_NOT_FOUND",
            Self::TemplateExecution => "EXECUTION_TEMPLATE_FAILED",
            Self::HookFailure => "EXECUTION_HOOK_FAILED",
            Self::ResourceExhausted => "EXECUTION_RESOURCE_EXHAUSTED",
            Self::Timeout => "TIMEOUT",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ComplexityCalculation | Self::CapabilityDetection | Self::StrategyDetermination => {
                ErrorCategory::Analysis
            }
            Self::InvalidResourceKind
            | Self::CodeGeneration
            | Self::ResourceExecution
            | Self::UnsafeResource => ErrorCategory::Synthesis,
            Self::NoMatchingTemplate
            | Self::InstanceCreation
            | Self::ConcurrencyLimit
            | Self::InstanceNotFound => ErrorCategory::Assignment,
            Self::TemplateExecution | Self::HookFailure | Self::ResourceExhausted => {
                ErrorCategory::Execution
            }
            Self::Timeout => ErrorCategory::Timeout,
        }
    }

    /// Default recoverability for this kind.
    ///
    /// A full admission slot is a hard rejection: the instance stays busy until its
    /// current task finishes, so retrying the same binding cannot succeed.
    pub fn default_recoverable(&self) -> bool {
        match self {
            Self::ComplexityCalculation
            | Self::CapabilityDetection
            | Self::StrategyDetermination
            | Self::CodeGeneration
            | Self::ResourceExecution
            | Self::InstanceCreation
            | Self::TemplateExecution
            | Self::HookFailure => true,
            Self::InvalidResourceKind
            | Self::UnsafeResource
            | Self::NoMatchingTemplate
            | Self::ConcurrencyLimit
            | Self::InstanceNotFound
            | Self::ResourceExhausted
            | Self::Timeout => false,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Ordered key/value context attached to an error
pub type ErrorContext = BTreeMap<String, String>;

/// The engine's structured failure
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("[{}] {message}", .kind.code())]
pub struct ForgeError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: ErrorContext,
    pub recoverable: bool,
    pub timestamp: DateTime<Utc>,
}

impl ForgeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: ErrorContext::new(),
            recoverable: kind.default_recoverable(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a context value
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Override the kind's default recoverability
    pub fn with_recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    pub fn analysis(kind: ErrorKind, task_id: impl ToString, message: impl Into<String>) -> Self {
        Self::new(kind, message)
            .with_context("stage", "analyze")
            .with_context("task_id", task_id)
    }

    pub fn invalid_resource_kind(kind: &str, category: &str, valid: &[&str]) -> Self {
        Self::new(
            ErrorKind::InvalidResourceKind,
            format!(
                "unknown {} kind '{}', expected one of: {}",
                category,
                kind,
                valid.join(", ")
            ),
        )
        .with_context("stage", "synthesize")
        .with_context("kind", kind)
        .with_context("category", category)
        .with_context("valid_kinds", valid.join(","))
    }

    pub fn code_generation(resource: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CodeGeneration, message)
            .with_context("stage", "synthesize")
            .with_context("resource", resource)
    }

    pub fn resource_execution(resource_id: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceExecution, message)
            .with_context("stage", "execute_resource")
            .with_context("resource_id", resource_id)
    }

    pub fn no_template(task_kind: impl ToString) -> Self {
        let task_kind = task_kind.to_string();
        Self::new(
            ErrorKind::NoMatchingTemplate,
            format!("no worker template supports task kind '{}'", task_kind),
        )
        .with_context("stage", "decide")
        .with_context("task_kind", task_kind)
    }

    pub fn instance_creation(template_id: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InstanceCreation, message)
            .with_context("stage", "create_instance")
            .with_context("template_id", template_id)
    }

    pub fn concurrency_limit(instance_id: impl ToString, limit: u32) -> Self {
        let instance_id = instance_id.to_string();
        Self::new(
            ErrorKind::ConcurrencyLimit,
            format!(
                "instance {} already runs its maximum of {} concurrent task(s)",
                instance_id, limit
            ),
        )
        .with_context("stage", "bind")
        .with_context("instance_id", instance_id)
        .with_context("max_concurrent_tasks", limit)
    }

    pub fn instance_not_found(instance_id: impl ToString) -> Self {
        let instance_id = instance_id.to_string();
        Self::new(
            ErrorKind::InstanceNotFound,
            format!("worker instance {} is not in the pool", instance_id),
        )
        .with_context("instance_id", instance_id)
    }

    pub fn template_execution(template_id: &str, task_id: impl ToString, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TemplateExecution, message)
            .with_context("stage", "execute")
            .with_context("template_id", template_id)
            .with_context("task_id", task_id)
    }

    pub fn hook_failure(hook: &str, phase: impl ToString, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HookFailure, message)
            .with_context("stage", "hook")
            .with_context("hook", hook)
            .with_context("phase", phase)
    }

    pub fn resource_exhausted(resource: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceExhausted, message).with_context("resource", resource)
    }

    pub fn timeout(operation: &str, limit: Duration, elapsed: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!(
                "operation '{}' exceeded {}ms (elapsed {}ms)",
                operation,
                limit.as_millis(),
                elapsed.as_millis()
            ),
        )
        .with_context("operation", operation)
        .with_context("limit_ms", limit.as_millis())
        .with_context("elapsed_ms", elapsed.as_millis())
    }
}
