//! # Assignment Orchestration
//!
//! [`AssignmentOrchestrator`] is the composition root of the engine. Each call to
//! [`assign`](AssignmentOrchestrator::assign) walks one task through five steps:
//!
//! ```text
//! Analyze ──► Synthesize ──► Decide ──► Bind & execute ──► Record
//!  (cached)    (store)       (strategy    (hooks, timeout)   (history,
//!                             chain)                          counters)
//! ```
//!
//! - **Analyze**: complexity analysis, cached per task id until invalidated.
//! - **Synthesize**: requirements that are critical or above the priority threshold
//!   are taken from the resource store by name or synthesized and stored.
//!   Optional failures are skipped, critical ones abort.
//! - **Decide**: the strategy chain is walked until an instance is claimed or created.
//! - **Bind & execute**: resources are attached, pre hooks may veto, the template
//!   executor runs under the task timeout, then post or error hooks run.
//! - **Record**: every outcome lands in the bounded history and the counters.
//!
//! Failures surface as [`ForgeError`](crate::error::ForgeError) carrying a stable
//! code and the failing ids, so callers branch on recoverability rather than text.

pub mod assignment;
pub mod report;

pub use assignment::AssignmentOrchestrator;
pub use report::{AssignmentRecord, AssignmentReport, OrchestratorStatistics, ResourceBinding};
