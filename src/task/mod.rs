pub mod analyzer;
pub mod strategy;
pub mod types;


pub use analyzer::*;
pub use strategy::*;
pub use types::*;
