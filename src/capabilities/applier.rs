//! File-edit capability: preview (dry run) or write a set of file changes

use crate::error::PipelineError;
use crate::task::{FileChange, FileChangeKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Outcome of applying or simulating a change set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub success: bool,
    pub conflicts: Vec<String>,
    pub warnings: Vec<String>,
    /// Paths actually written or removed; always empty for a dry run
    pub applied: Vec<String>,
}

#[async_trait]
pub trait FileEditApplier: Send + Sync {
    /// Check `changes` for conflicts and, unless `dry_run`, write them.
    /// A change set with conflicts is never partially written.
    async fn apply(&self, changes: &[FileChange], dry_run: bool)
        -> Result<ApplyReport, PipelineError>;
}

/// Applies changes below a workspace root with `tokio::fs`
pub struct FsEditApplier {
    root: PathBuf,
    max_file_size: usize,
}

impl FsEditApplier {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_file_size: 1024 * 1024,
        }
    }

    /// Relative, non-escaping paths only (pure function)
    fn validate_path(path: &str) -> Result<(), String> {
        let relative = Path::new(path);
        if path.trim().is_empty() {
            return Err("empty path".to_string());
        }
        if relative.is_absolute() {
            return Err(format!("{path} is absolute"));
        }
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(format!("{path} escapes the workspace"));
        }
        Ok(())
    }

    /// Check content size constraints (pure function)
    fn check_content_size(path: &str, len: usize, max: usize) -> Result<(), String> {
        if len > max {
            return Err(format!("{path} is too large: {len} bytes (max: {max})"));
        }
        Ok(())
    }

    async fn existing_content(path: &Path) -> Result<Option<String>, PipelineError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::internal_error(format!(
                "cannot read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn write(&self, change: &FileChange) -> Result<(), PipelineError> {
        let full = self.root.join(&change.path);
        let io_error =
            |e: std::io::Error| PipelineError::internal_error(format!("{}: {e}", change.path));

        match change.kind {
            FileChangeKind::Create | FileChangeKind::Modify => {
                if let Some(parent) = full.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
                }
                tokio::fs::write(&full, change.content())
                    .await
                    .map_err(io_error)?;
            }
            FileChangeKind::Delete => {
                tokio::fs::remove_file(&full).await.map_err(io_error)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FileEditApplier for FsEditApplier {
    async fn apply(
        &self,
        changes: &[FileChange],
        dry_run: bool,
    ) -> Result<ApplyReport, PipelineError> {
        let mut report = ApplyReport::default();
        let mut seen = HashSet::new();

        for change in changes {
            if let Err(reason) = Self::validate_path(&change.path) {
                report.conflicts.push(reason);
                continue;
            }
            if !seen.insert(change.path.as_str()) {
                report
                    .conflicts
                    .push(format!("{} is changed more than once", change.path));
                continue;
            }
            if let Err(reason) =
                Self::check_content_size(&change.path, change.content().len(), self.max_file_size)
            {
                report.conflicts.push(reason);
                continue;
            }

            let full = self.root.join(&change.path);
            let current = Self::existing_content(&full).await?;

            match (change.kind, &current) {
                (FileChangeKind::Create, Some(_)) => {
                    report
                        .conflicts
                        .push(format!("{} already exists", change.path));
                }
                (FileChangeKind::Modify | FileChangeKind::Delete, None) => {
                    report
                        .conflicts
                        .push(format!("{} does not exist", change.path));
                }
                (FileChangeKind::Create, None) => {
                    if full.parent().is_some_and(|p| !p.exists()) {
                        report
                            .warnings
                            .push(format!("{} creates a new directory", change.path));
                    }
                }
                (FileChangeKind::Modify, Some(existing)) => {
                    if existing == change.content() {
                        report
                            .warnings
                            .push(format!("{} is unchanged", change.path));
                    }
                }
                (FileChangeKind::Delete, Some(_)) => {}
            }

            if let (Some(expected), Some(existing)) = (&change.expected_before, &current) {
                if expected != existing {
                    report.conflicts.push(format!(
                        "{} changed since it was read",
                        change.path
                    ));
                }
            }
        }

        report.success = report.conflicts.is_empty();
        debug!(
            changes = changes.len(),
            conflicts = report.conflicts.len(),
            warnings = report.warnings.len(),
            dry_run,
            "Checked file changes"
        );

        if dry_run || !report.success {
            return Ok(report);
        }

        for change in changes {
            self.write(change).await?;
            report.applied.push(change.path.clone());
        }
        info!(files = report.applied.len(), root = %self.root.display(), "Applied file changes");

        Ok(report)
    }
}
