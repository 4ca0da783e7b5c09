//! Concrete `LlmProvider` backends

pub mod anthropic;

pub use anthropic::*;
