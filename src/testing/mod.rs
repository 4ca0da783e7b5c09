//! Testing utilities and mock implementations
//!
//! Doubles for the AI capability, LLM provider, repository index, validator,
//! edit applier, test runner and progress sink.

pub mod mocks;

pub use mocks::*;
