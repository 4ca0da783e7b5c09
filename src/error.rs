//! Error taxonomy for the task pipeline
//!
//! Every failure the engine can observe is a `PipelineError`. Each variant maps
//! onto a stable, machine-readable `ErrorKind` so callers can branch on the
//! category without parsing messages.

use crate::task::StepType;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unsupported task type: {task_type}")]
    UnsupportedTaskType { task_type: String },

    #[error("Invalid constraints: {message}")]
    InvalidConstraints { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("AI backend error: {0}")]
    Ai(#[from] crate::llm::LlmError),

    #[error("Repository index error: {message}")]
    RepositoryIndex { message: String },

    #[error("Failed to parse AI response: {message}")]
    Parse { message: String },

    #[error("Conflicting file changes: {}", conflicts.join("; "))]
    Conflict { conflicts: Vec<String> },

    #[error("Constraint violated: {message}")]
    ConstraintViolation { message: String },

    #[error("No completed {step_type} step output available")]
    MissingOutput { step_type: StepType },

    #[error("Test execution failed: {message}")]
    TestExecution { message: String },

    #[error("Task timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },

    #[error("Task was cancelled")]
    Cancelled,

    #[error("Error correction failed: {message}")]
    CorrectionFailed { message: String },

    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Stable classification of pipeline errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    InvalidInput,
    AiBackend,
    RepositoryIndex,
    Parse,
    Conflict,
    ConstraintViolation,
    MissingOutput,
    TestExecution,
    Timeout,
    Cancelled,
    CorrectionFailed,
    NotFound,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::AiBackend => "ai_backend",
            ErrorKind::RepositoryIndex => "repository_index",
            ErrorKind::Parse => "parse",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ConstraintViolation => "constraint_violation",
            ErrorKind::MissingOutput => "missing_output",
            ErrorKind::TestExecution => "test_execution",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::CorrectionFailed => "correction_failed",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl PipelineError {
    /// Machine-readable category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::UnsupportedTaskType { .. }
            | PipelineError::InvalidConstraints { .. }
            | PipelineError::Config(_) => ErrorKind::Configuration,
            PipelineError::InvalidInput { .. } => ErrorKind::InvalidInput,
            PipelineError::Ai(_) => ErrorKind::AiBackend,
            PipelineError::RepositoryIndex { .. } => ErrorKind::RepositoryIndex,
            PipelineError::Parse { .. } => ErrorKind::Parse,
            PipelineError::Conflict { .. } => ErrorKind::Conflict,
            PipelineError::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            PipelineError::MissingOutput { .. } => ErrorKind::MissingOutput,
            PipelineError::TestExecution { .. } => ErrorKind::TestExecution,
            PipelineError::Timeout { .. } => ErrorKind::Timeout,
            PipelineError::Cancelled => ErrorKind::Cancelled,
            PipelineError::CorrectionFailed { .. } => ErrorKind::CorrectionFailed,
            PipelineError::TaskNotFound { .. } => ErrorKind::NotFound,
            PipelineError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Create unsupported task type error
    pub fn unsupported_task_type<S: Into<String>>(task_type: S) -> Self {
        Self::UnsupportedTaskType {
            task_type: task_type.into(),
        }
    }

    /// Create invalid constraints error
    pub fn invalid_constraints<S: Into<String>>(message: S) -> Self {
        Self::InvalidConstraints {
            message: message.into(),
        }
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create repository index error
    pub fn repository_index<S: Into<String>>(message: S) -> Self {
        Self::RepositoryIndex {
            message: message.into(),
        }
    }

    /// Create parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create constraint violation error
    pub fn constraint_violation<S: Into<String>>(message: S) -> Self {
        Self::ConstraintViolation {
            message: message.into(),
        }
    }

    /// Create test execution error
    pub fn test_execution<S: Into<String>>(message: S) -> Self {
        Self::TestExecution {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Error recorded on a task that did not complete
///
/// `Display` renders only the message, so the task's error reads as free text
/// while `kind` stays available for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&PipelineError> for TaskError {
    fn from(error: &PipelineError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
