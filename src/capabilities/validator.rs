//! Validation capability: five independent check categories over proposed edits

use crate::error::PipelineError;
use crate::task::{FileChange, ValidationError, ValidationWarning};
use async_trait::async_trait;

/// Each check sees the full change set and reports its own category only.
/// Implementations may fail per category; the sub-pipeline treats a failed
/// category as having no findings.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn check_syntax(
        &self,
        changes: &[FileChange],
    ) -> Result<Vec<ValidationError>, PipelineError>;

    async fn check_semantics(
        &self,
        changes: &[FileChange],
    ) -> Result<Vec<ValidationError>, PipelineError>;

    async fn check_style(
        &self,
        changes: &[FileChange],
    ) -> Result<Vec<ValidationWarning>, PipelineError>;

    async fn check_performance(
        &self,
        changes: &[FileChange],
    ) -> Result<Vec<ValidationWarning>, PipelineError>;

    async fn check_security(
        &self,
        changes: &[FileChange],
    ) -> Result<Vec<ValidationError>, PipelineError>;
}
