//! File changes, impact analysis and the final task result

use serde::{Deserialize, Serialize};

/// What a proposed edit does to one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    Create,
    Modify,
    Delete,
}

/// One proposed file edit, as parsed from the AI response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub kind: FileChangeKind,
    /// New file content; absent for deletions
    #[serde(default)]
    pub content: Option<String>,
    /// Content the file is expected to have before the edit
    #[serde(default)]
    pub expected_before: Option<String>,
}

impl FileChange {
    pub fn create(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FileChangeKind::Create,
            content: Some(content.into()),
            expected_before: None,
        }
    }

    pub fn modify(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FileChangeKind::Modify,
            content: Some(content.into()),
            expected_before: None,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FileChangeKind::Delete,
            content: None,
            expected_before: None,
        }
    }

    pub fn content(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Addition,
    Deletion,
    Modification,
}

/// A contiguous region of a file that changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub change_type: ChangeType,
    /// 1-based, inclusive, in the original file's numbering
    pub start_line: usize,
    pub end_line: usize,
    pub before: String,
    pub after: String,
    pub reason: String,
}

/// Diff two file versions into at most one `Change`
///
/// The changed region is what remains after stripping the common leading and
/// trailing lines. Identical inputs yield no changes.
pub fn diff_lines(before: &str, after: &str, reason: &str) -> Vec<Change> {
    let old: Vec<&str> = before.lines().collect();
    let new: Vec<&str> = after.lines().collect();

    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = old.len().min(new.len()) - prefix;
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let removed = &old[prefix..old.len() - suffix];
    let added = &new[prefix..new.len() - suffix];

    if removed.is_empty() && added.is_empty() {
        return Vec::new();
    }

    let change_type = match (removed.is_empty(), added.is_empty()) {
        (true, false) => ChangeType::Addition,
        (false, true) => ChangeType::Deletion,
        _ => ChangeType::Modification,
    };

    let start_line = prefix + 1;
    let end_line = if removed.is_empty() {
        start_line
    } else {
        prefix + removed.len()
    };

    vec![Change {
        change_type,
        start_line,
        end_line,
        before: removed.join("\n"),
        after: added.join("\n"),
        reason: reason.to_string(),
    }]
}

/// Number of lines touched by a set of changes
pub fn lines_changed(changes: &[Change]) -> usize {
    changes
        .iter()
        .map(|change| {
            let before = change.before.lines().count();
            let after = change.after.lines().count();
            before.max(after)
        })
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakingChangeType {
    Api,
    Signature,
    Behavior,
    Dependency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakingChange {
    pub change_type: BreakingChangeType,
    pub severity: Severity,
    pub description: String,
    pub mitigation: String,
    pub affected_symbols: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceImpact {
    Positive,
    Negative,
    #[default]
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityImpact {
    Improved,
    Degraded,
    #[default]
    Neutral,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    pub affected_files: Vec<String>,
    pub breaking_changes: Vec<BreakingChange>,
    pub performance_impact: PerformanceImpact,
    pub security_impact: SecurityImpact,
    pub complexity_score: f64,
    pub test_coverage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileModification {
    pub path: String,
    pub original_content: String,
    pub new_content: String,
    pub changes: Vec<Change>,
    pub impact: ImpactAnalysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCreation {
    pub path: String,
    pub content: String,
    pub changes: Vec<Change>,
    pub impact: ImpactAnalysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDeletion {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetrics {
    pub execution_time_ms: u64,
    pub lines_changed: usize,
    pub files_affected: usize,
    pub quality_score: f64,
    pub complexity_score: f64,
    pub performance_score: f64,
}

/// Produced only when a task reaches `completed`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub modifications: Vec<FileModification>,
    pub creations: Vec<FileCreation>,
    pub deletions: Vec<FileDeletion>,
    pub summary: String,
    pub metrics: TaskMetrics,
    pub recommendations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_content_has_no_changes() {
        assert!(diff_lines("a\nb\n", "a\nb\n", "noop").is_empty());
    }

    #[test]
    fn test_modified_middle_line() {
        let changes = diff_lines("a\nb\nc", "a\nB\nc", "rename");
        assert_eq!(changes.len(), 1);

        let change = &changes[0];
        assert_eq!(change.change_type, ChangeType::Modification);
        assert_eq!((change.start_line, change.end_line), (2, 2));
        assert_eq!(change.before, "b");
        assert_eq!(change.after, "B");
        assert_eq!(change.reason, "rename");
    }

    #[test]
    fn test_appended_lines_are_an_addition() {
        let changes = diff_lines("a\nb", "a\nb\nc\nd", "extend");
        assert_eq!(changes[0].change_type, ChangeType::Addition);
        assert_eq!(changes[0].start_line, 3);
        assert_eq!(changes[0].after, "c\nd");
        assert_eq!(lines_changed(&changes), 2);
    }

    #[test]
    fn test_removed_lines_are_a_deletion() {
        let changes = diff_lines("a\nb\nc", "a\nc", "drop");
        assert_eq!(changes[0].change_type, ChangeType::Deletion);
        assert_eq!((changes[0].start_line, changes[0].end_line), (2, 2));
        assert_eq!(changes[0].before, "b");
    }

    #[test]
    fn test_repeated_lines_do_not_overlap_prefix_and_suffix() {
        // "x" appears in both prefix and suffix candidates
        let changes = diff_lines("x\nx", "x\nx\nx", "dup");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Addition);
        assert_eq!(changes[0].after, "x");
    }

    #[test]
    fn test_new_file_diff_is_full_addition() {
        let changes = diff_lines("", "fn main() {}\n", "create");
        assert_eq!(changes[0].change_type, ChangeType::Addition);
        assert_eq!(changes[0].start_line, 1);
    }
}
