//! # Resource Synthesis
//!
//! Converts abstract [`ResourceRequirement`]s into [`SynthesizedResource`]s.
//!
//! Tools dispatch on kind to one of four templates:
//!
//! | Kind | Shape | Payload |
//! |---|---|---|
//! | `command` | command-wrapper | program + base args, rendered as an `sh` script |
//! | `api` | api-wrapper | base URL, method, headers, rendered as a `curl` script |
//! | `library` | function | source text whose entry names a registered handler |
//! | `service` | class-like | source text whose entry names a registered handler |
//!
//! Hooks dispatch on phase (`pre` validation, `post` notification or cleanup,
//! `error` escalation or rollback) and carry a declarative [`HookDescriptor`].
//!
//! Synthesized resources live in a [`ResourceStore`] owned by the orchestrator and can
//! be exported verbatim to a file.

pub mod store;
pub mod synthesizer;
pub mod templates;
pub mod types;

pub use store::{ExportError, ResourceStore};
pub use synthesizer::{ResourceSynthesizer, SynthesisCounts};
pub use types::*;
