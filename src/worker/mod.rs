//! # Worker Templates and Instances
//!
//! A [`WorkerTemplate`] describes a kind of worker: which task kinds it accepts,
//! which capabilities it brings and the [`WorkerExecutor`] that does the work.
//! The [`WorkerRegistry`] owns every template and every live [`WorkerInstance`];
//! callers only ever see snapshots.
//!
//! Instances move `idle -> running -> {completed, failed}`. Idle and completed
//! instances can be claimed again; claiming and creation both mark the instance
//! running under the registry lock, so two assignments never bind the same slot.
//!
//! Executors receive a typed [`ExecutionContext`] carrying configuration, hooks,
//! utilities and the resources synthesized for the task.

pub mod context;
pub mod instance;
pub mod registry;
pub mod template;

pub use context::{ExecutionContext, ExecutionUtils, LogCallback, LogLevel, MemoCache};
pub use instance::{InstanceExecutionRecord, InstanceStatus, WorkerInstance};
pub use registry::{RegistryStatistics, WorkerRegistry};
pub use template::{FnExecutor, WorkerExecutor, WorkerTemplate};
