//! # Lifecycle Hooks
//!
//! Ordered chains of handlers that run around a worker's executor.
//!
//! - **pre** hooks may veto execution: the first failing hook without
//!   continue-on-failure aborts the assignment with `EXECUTION_HOOK_FAILED`.
//! - **post** hooks run after success and cannot change the result.
//! - **error** hooks run after failure and are advisory.
//!
//! Within a phase hooks run by ascending priority, ties broken by registration
//! order. Post and error failures are logged and swallowed.

pub mod manager;
pub mod synthesized;

pub use manager::{HookContext, HookHandler, HookManager, HookOptions, HookRunSummary, RegisteredHook};
pub use synthesized::SynthesizedHookHandler;
