//! Language-agnostic, line-based `Validator`

use super::index::{analyze_source, language_for};
use super::validator::Validator;
use crate::error::PipelineError;
use crate::task::{
    FileChange, FileChangeKind, FindingSeverity, ValidationError, ValidationErrorKind,
    ValidationWarning, ValidationWarningKind,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static SECRET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(api[_-]?key|secret|password|passwd|access[_-]?token)\b\s*[:=]\s*["'][^"']{8,}["']"#)
        .expect("secret pattern is valid")
});

static EVAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\beval\s*\(").expect("eval pattern is valid"));

static UNSAFE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bunsafe\s*\{").expect("unsafe pattern is valid"));

static PLAIN_HTTP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"http://(?:[A-Za-z0-9.-]+)").expect("http pattern is valid")
});

static COLLECT_LEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.collect(?:::<.*?>)?\(\)\s*\.len\(\)").expect("collect pattern is valid")
});

static LOOP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(for|while|loop)\b").expect("loop pattern is valid"));

/// Thresholds for the heuristic checks
#[derive(Debug, Clone)]
pub struct HeuristicValidator {
    pub max_line_length: usize,
    pub max_loop_nesting: usize,
}

impl Default for HeuristicValidator {
    fn default() -> Self {
        Self {
            max_line_length: 120,
            max_loop_nesting: 2,
        }
    }
}

impl HeuristicValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Changes that carry content worth checking
    fn written(changes: &[FileChange]) -> impl Iterator<Item = &FileChange> {
        changes
            .iter()
            .filter(|change| change.kind != FileChangeKind::Delete)
    }

    fn is_source(path: &str) -> bool {
        !matches!(language_for(path), "markdown" | "text" | "config")
    }

    fn error(
        kind: ValidationErrorKind,
        severity: FindingSeverity,
        file: &str,
        line: usize,
        column: usize,
        message: String,
    ) -> ValidationError {
        ValidationError {
            kind,
            message,
            file: file.to_string(),
            line,
            column,
            severity,
        }
    }

    fn warning(
        kind: ValidationWarningKind,
        file: &str,
        line: usize,
        column: usize,
        message: String,
        suggestion: &str,
    ) -> ValidationWarning {
        ValidationWarning {
            kind,
            message,
            file: file.to_string(),
            line,
            column,
            suggestion: Some(suggestion.to_string()),
        }
    }

    /// First bracket imbalance in `content`, skipping string literals and line comments
    fn bracket_imbalance(content: &str) -> Option<(usize, usize, String)> {
        let mut stack: Vec<(char, usize, usize)> = Vec::new();

        for (line_idx, line) in content.lines().enumerate() {
            let line_no = line_idx + 1;
            let mut quote: Option<char> = None;
            let mut escaped = false;

            for (col_idx, (byte_idx, ch)) in line.char_indices().enumerate() {
                let col = col_idx + 1;
                if let Some(q) = quote {
                    if escaped {
                        escaped = false;
                    } else if ch == '\\' {
                        escaped = true;
                    } else if ch == q {
                        quote = None;
                    }
                    continue;
                }

                match ch {
                    '"' | '`' => quote = Some(ch),
                    '/' if line[byte_idx..].starts_with("//") => break,
                    '(' | '[' | '{' => stack.push((ch, line_no, col)),
                    ')' | ']' | '}' => {
                        let expected = match ch {
                            ')' => '(',
                            ']' => '[',
                            _ => '{',
                        };
                        match stack.pop() {
                            Some((open, _, _)) if open == expected => {}
                            Some((open, open_line, open_col)) => {
                                return Some((
                                    line_no,
                                    col,
                                    format!(
                                        "Mismatched '{ch}': '{open}' opened at {open_line}:{open_col}"
                                    ),
                                ))
                            }
                            None => {
                                return Some((line_no, col, format!("Unmatched closing '{ch}'")))
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        stack
            .pop()
            .map(|(open, line, col)| (line, col, format!("Unclosed '{open}'")))
    }
}

#[async_trait]
impl Validator for HeuristicValidator {
    async fn check_syntax(
        &self,
        changes: &[FileChange],
    ) -> Result<Vec<ValidationError>, PipelineError> {
        Ok(Self::written(changes)
            .filter(|change| Self::is_source(&change.path))
            .filter_map(|change| {
                Self::bracket_imbalance(change.content()).map(|(line, column, message)| {
                    Self::error(
                        ValidationErrorKind::Syntax,
                        FindingSeverity::Error,
                        &change.path,
                        line,
                        column,
                        message,
                    )
                })
            })
            .collect())
    }

    async fn check_semantics(
        &self,
        changes: &[FileChange],
    ) -> Result<Vec<ValidationError>, PipelineError> {
        let mut errors = Vec::new();

        for change in Self::written(changes) {
            if change.content().trim().is_empty() {
                errors.push(Self::error(
                    ValidationErrorKind::Semantic,
                    FindingSeverity::Error,
                    &change.path,
                    1,
                    1,
                    "File would be left empty".to_string(),
                ));
                continue;
            }

            let analysis = analyze_source(&change.path, change.content());
            let mut seen = HashSet::new();
            for name in analysis.functions.iter().chain(analysis.types.iter()) {
                if !seen.insert(name.as_str()) {
                    errors.push(Self::error(
                        ValidationErrorKind::Semantic,
                        FindingSeverity::Error,
                        &change.path,
                        1,
                        1,
                        format!("Duplicate definition of '{name}'"),
                    ));
                }
            }
        }

        Ok(errors)
    }

    async fn check_style(
        &self,
        changes: &[FileChange],
    ) -> Result<Vec<ValidationWarning>, PipelineError> {
        let mut warnings = Vec::new();

        for change in Self::written(changes) {
            let tabs_allowed = language_for(&change.path) == "go"
                || change.path.ends_with("Makefile");

            for (idx, line) in change.content().lines().enumerate() {
                let line_no = idx + 1;
                let length = line.chars().count();
                if length > self.max_line_length {
                    warnings.push(Self::warning(
                        ValidationWarningKind::Style,
                        &change.path,
                        line_no,
                        self.max_line_length + 1,
                        format!("Line is {length} characters long"),
                        "Wrap the line",
                    ));
                }
                if line.ends_with(' ') || line.ends_with('\t') {
                    warnings.push(Self::warning(
                        ValidationWarningKind::Style,
                        &change.path,
                        line_no,
                        line.trim_end().chars().count() + 1,
                        "Trailing whitespace".to_string(),
                        "Remove trailing whitespace",
                    ));
                }
                if !tabs_allowed && line.starts_with('\t') {
                    warnings.push(Self::warning(
                        ValidationWarningKind::Convention,
                        &change.path,
                        line_no,
                        1,
                        "Tab indentation".to_string(),
                        "Indent with spaces",
                    ));
                }
            }
        }

        Ok(warnings)
    }

    async fn check_performance(
        &self,
        changes: &[FileChange],
    ) -> Result<Vec<ValidationWarning>, PipelineError> {
        let mut warnings = Vec::new();

        for change in Self::written(changes).filter(|c| Self::is_source(&c.path)) {
            // Brace depth at which each open loop body starts
            let mut loop_depths: Vec<usize> = Vec::new();
            let mut depth = 0usize;
            let mut reported = false;

            for (idx, line) in change.content().lines().enumerate() {
                let line_no = idx + 1;

                if let Some(m) = COLLECT_LEN_RE.find(line) {
                    warnings.push(Self::warning(
                        ValidationWarningKind::Performance,
                        &change.path,
                        line_no,
                        m.start() + 1,
                        "Collecting only to take the length".to_string(),
                        "Use .count() instead of .collect().len()",
                    ));
                }

                if LOOP_RE.is_match(line) && line.contains('{') {
                    loop_depths.push(depth);
                    if loop_depths.len() > self.max_loop_nesting && !reported {
                        reported = true;
                        warnings.push(Self::warning(
                            ValidationWarningKind::Performance,
                            &change.path,
                            line_no,
                            1,
                            format!("Loops nested {} deep", loop_depths.len()),
                            "Restructure nested loops or index the inner collection",
                        ));
                    }
                }

                for ch in line.chars() {
                    match ch {
                        '{' => depth += 1,
                        '}' => {
                            depth = depth.saturating_sub(1);
                            while loop_depths.last().is_some_and(|d| *d >= depth) {
                                loop_depths.pop();
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        Ok(warnings)
    }

    async fn check_security(
        &self,
        changes: &[FileChange],
    ) -> Result<Vec<ValidationError>, PipelineError> {
        let mut errors = Vec::new();

        for change in Self::written(changes) {
            for (idx, line) in change.content().lines().enumerate() {
                let line_no = idx + 1;

                if let Some(m) = SECRET_RE.find(line) {
                    errors.push(Self::error(
                        ValidationErrorKind::Security,
                        FindingSeverity::Error,
                        &change.path,
                        line_no,
                        m.start() + 1,
                        "Hard-coded credential".to_string(),
                    ));
                }
                if let Some(m) = EVAL_RE.find(line) {
                    errors.push(Self::error(
                        ValidationErrorKind::Security,
                        FindingSeverity::Error,
                        &change.path,
                        line_no,
                        m.start() + 1,
                        "Dynamic code evaluation".to_string(),
                    ));
                }
                if let Some(m) = UNSAFE_RE.find(line) {
                    errors.push(Self::error(
                        ValidationErrorKind::Security,
                        FindingSeverity::Warning,
                        &change.path,
                        line_no,
                        m.start() + 1,
                        "Unsafe block".to_string(),
                    ));
                }
                for m in PLAIN_HTTP_RE.find_iter(line) {
                    let host = m.as_str().trim_start_matches("http://");
                    if host.starts_with("localhost") || host.starts_with("127.0.0.1") {
                        continue;
                    }
                    errors.push(Self::error(
                        ValidationErrorKind::Security,
                        FindingSeverity::Info,
                        &change.path,
                        line_no,
                        m.start() + 1,
                        format!("Unencrypted URL {}", m.as_str()),
                    ));
                }
            }
        }

        Ok(errors)
    }
}
