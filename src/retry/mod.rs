//! # Retry and Timeout Primitives
//!
//! Exponential-backoff retry with an optional per-attempt deadline, an independent
//! per-item batch variant, and a standalone wall-clock timeout wrapper.
//!
//! Retry decisions default to [`ForgeError::is_recoverable`](crate::error::ForgeError::is_recoverable):
//! recoverable failures are retried until the budget runs out, anything else
//! propagates after the first attempt.
//!
//! Timeouts give up waiting; they do not abort work the operation already handed
//! off elsewhere (spawned tasks, child processes without kill-on-drop).

pub mod backoff;
pub mod timeout;

pub use backoff::{RetryOutcome, RetryPolicy, retry_batch, retry_with_backoff, retry_with_backoff_if};
pub use timeout::with_timeout;
