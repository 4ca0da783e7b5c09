//! Collaborator capabilities consumed by the pipeline, and their concrete adapters
//!
//! The engine only talks to the outside world through these traits, so every
//! one of them has a double in `crate::testing::mocks`.

pub mod ai;
pub mod applier;
pub mod heuristic_validator;
pub mod index;
pub mod test_runner;
pub mod validator;
pub mod workspace_index;

pub use ai::{AiCompletion, ProviderCompletion};
pub use applier::{ApplyReport, FileEditApplier, FsEditApplier};
pub use heuristic_validator::HeuristicValidator;
pub use index::{analyze_source, FileAnalysis, PublicSymbol, RepositoryIndex, RepositoryStats};
pub use test_runner::{CommandTestRunner, TestCase, TestKind, TestOutcome, TestRunner};
pub use validator::Validator;
pub use workspace_index::WorkspaceIndex;
