//! # Time-Bounded LRU Cache
//!
//! [`TtlCache`] is a capacity-bounded key/value store where entries may carry an
//! expiry. It backs the orchestrator's per-task analysis cache and the generic
//! memoization used by the dynamic executor.
//!
//! - Reads of expired entries report "not found" and drop the entry.
//! - Inserting past capacity evicts the least-recently-accessed entry first,
//!   whether or not anything has expired.
//! - All mutation goes through one async mutex, so concurrent tasks on a
//!   multi-threaded runtime cannot corrupt the map.

pub mod ttl_cache;

pub use ttl_cache::{CacheEntry, CacheStats, TtlCache};
