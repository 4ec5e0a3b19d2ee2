//! # Agent Forge
//!
//! Assigns tasks to reusable, template-defined workers and synthesizes the tools
//! and hooks a task needs at the moment it is assigned.
//!
//! ## Architecture Overview
//!
//! Modules, leaves first:
//!
//! - **[`cache`]** and **[`retry`]**: TTL/LRU cache, exponential backoff and timeouts
//! - **[`error`]**: the structured [`ForgeError`] every layer reports through
//! - **[`task`]**: task model, complexity analysis and strategy selection
//! - **[`synthesis`]**: turns tool and hook requirements into executable resources
//! - **[`executor`]**: runs synthesized resources (handlers, subprocesses, HTTP)
//! - **[`hooks`]**: ordered pre/post/error hook chains
//! - **[`worker`]**: worker templates, instances and the registry that owns them
//! - **[`orchestrator`]**: the end-to-end assignment pipeline
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agent_forge::{AssignmentOrchestrator, ForgeConfig, Task, TaskKind, WorkerTemplate};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orchestrator = AssignmentOrchestrator::from_config(ForgeConfig::default())?;
//!     orchestrator
//!         .registry()
//!         .register_template(
//!             WorkerTemplate::from_fn("docs", "Docs writer", |task, _ctx| async move {
//!                 Ok(serde_json::json!({ "done": task.title }))
//!             })
//!             .with_kinds([TaskKind::Docs]),
//!         )
//!         .await;
//!
//!     let task = Task::new("Fix typo in documentation", "", TaskKind::Docs);
//!     let report = orchestrator.assign(&task).await?;
//!     println!("{} ran on {}", report.task_id, report.instance_id);
//!     Ok(())
//! }
//! ```

/// Capacity- and time-bounded caching.
pub mod cache;

/// Command line argument definitions for the `agent-forge` binary.
pub mod cli;

/// TOML configuration and config file discovery.
pub mod config;

/// Environment constants and path utilities.
///
/// Centralizes directory and file names used throughout the crate.
pub mod env;

pub mod error;

/// Execution of synthesized resources.
pub mod executor;

pub mod hooks;

/// Task assignment pipeline.
pub mod orchestrator;

pub mod retry;

/// Tool and hook synthesis.
pub mod synthesis;

/// Task model, complexity analysis and assignment strategy.
pub mod task;

/// Worker templates, instances and the registry.
pub mod worker;

pub use config::{ConfigDiscovery, ForgeConfig};
pub use error::{ErrorKind, ForgeError, ForgeResult};
pub use executor::{DynamicExecutor, ExecutionOutcome, InvocationContext};
pub use hooks::{HookContext, HookHandler, HookManager, HookOptions};
pub use orchestrator::{AssignmentOrchestrator, AssignmentReport, OrchestratorStatistics};
pub use synthesis::{ResourceCategory, ResourceRequirement, ResourceStore, ResourceSynthesizer, SynthesizedResource};
pub use task::{AssignmentStrategy, ComplexityAnalysis, StrategyKind, Task, TaskAnalyzer, TaskKind, TaskPriority};
pub use worker::{ExecutionContext, WorkerExecutor, WorkerInstance, WorkerRegistry, WorkerTemplate};
