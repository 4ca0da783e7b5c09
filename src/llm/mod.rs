//! LLM provider abstraction backing the pipeline's AI completion capability

pub mod provider;
pub mod providers;

pub use provider::*;
pub use providers::*;
