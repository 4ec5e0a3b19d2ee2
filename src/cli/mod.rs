//! CLI-specific functionality for the agent-forge binary

pub mod args;

pub use args::{Args, Commands, parse_key_value};
