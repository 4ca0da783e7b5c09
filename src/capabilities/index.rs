//! Repository index capability
//!
//! The pipeline never parses source itself; it asks the index. `analyze_source`
//! is the line-oriented heuristic shared by the workspace index and by the
//! implementation step when it compares a file before and after an edit.

use crate::error::PipelineError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A publicly visible declaration and the line that declares it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicSymbol {
    pub name: String,
    pub signature: String,
}

/// Per-file structure and complexity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub path: String,
    pub language: String,
    pub lines: usize,
    /// Cyclomatic-style estimate: 1 + branch points
    pub complexity: u32,
    pub functions: Vec<String>,
    pub types: Vec<String>,
    pub imports: Vec<String>,
    pub public_symbols: Vec<PublicSymbol>,
}

impl FileAnalysis {
    /// Declared functions and types
    pub fn element_count(&self) -> usize {
        self.functions.len() + self.types.len()
    }
}

/// Aggregate counts over the indexed repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryStats {
    pub total_files: usize,
    pub total_lines: usize,
    pub total_elements: usize,
    pub average_complexity: f64,
}

#[async_trait]
pub trait RepositoryIndex: Send + Sync {
    async fn analyze_file(&self, path: &str) -> Result<FileAnalysis, PipelineError>;

    /// Current content of a file, `None` when it does not exist
    async fn read_file(&self, path: &str) -> Result<Option<String>, PipelineError>;

    async fn architecture_summary(&self) -> Result<String, PipelineError>;

    async fn naming_conventions(&self) -> Result<String, PipelineError>;

    async fn stats(&self) -> Result<RepositoryStats, PipelineError>;

    /// Files that import `path`
    async fn dependents_of(&self, path: &str) -> Result<Vec<String>, PipelineError>;
}

static BRANCH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(if|for|while|match|case|catch|loop|elif|except)\b|&&|\|\|")
        .expect("branch pattern is valid")
});

static FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:fn|function|def|func)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("function pattern is valid")
});

static TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:struct|enum|trait|class|interface)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("type pattern is valid")
});

static PUBLIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:pub(?:\([^)]*\))?\s+(?:async\s+)?(?:unsafe\s+)?(?:fn|struct|enum|trait|type|const|static|mod)|export\s+(?:default\s+)?(?:async\s+)?(?:function|class|const|let|interface|type))\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("public symbol pattern is valid")
});

static IMPORT_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^\s*(?:pub\s+)?use\s+([^;]+);",
        r#"^\s*import\s+.*?\bfrom\s+['"]([^'"]+)['"]"#,
        r#"^\s*import\s+['"]([^'"]+)['"]"#,
        r"^\s*from\s+([A-Za-z0-9_.]+)\s+import\b",
        r"^\s*import\s+([A-Za-z0-9_.]+)\s*;?\s*$",
        r#"require\(\s*['"]([^'"]+)['"]\s*\)"#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("import pattern is valid"))
    .collect()
});

/// Language name from a file extension
pub fn language_for(path: &str) -> &'static str {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("rs") => "rust",
        Some("ts") | Some("tsx") => "typescript",
        Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => "javascript",
        Some("py") => "python",
        Some("go") => "go",
        Some("java") => "java",
        Some("kt") => "kotlin",
        Some("c") | Some("h") => "c",
        Some("cpp") | Some("cc") | Some("hpp") => "cpp",
        Some("md") => "markdown",
        Some("toml") | Some("json") | Some("yaml") | Some("yml") => "config",
        _ => "text",
    }
}

/// Declared imports, in file order
pub fn extract_imports(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            IMPORT_RES
                .iter()
                .find_map(|re| re.captures(line))
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
        })
        .collect()
}

/// Heuristic structural analysis of one source file
pub fn analyze_source(path: &str, content: &str) -> FileAnalysis {
    let mut complexity = 1u32;
    let mut functions = Vec::new();
    let mut types = Vec::new();
    let mut public_symbols = Vec::new();

    for line in content.lines() {
        let code = strip_line_comment(line);
        complexity += BRANCH_RE.find_iter(code).count() as u32;

        functions.extend(FUNCTION_RE.captures_iter(code).map(|c| c[1].to_string()));
        types.extend(TYPE_RE.captures_iter(code).map(|c| c[1].to_string()));

        if let Some(caps) = PUBLIC_RE.captures(code) {
            public_symbols.push(PublicSymbol {
                name: caps[1].to_string(),
                signature: code.trim().trim_end_matches('{').trim_end().to_string(),
            });
        }
    }

    FileAnalysis {
        path: path.to_string(),
        language: language_for(path).to_string(),
        lines: content.lines().count(),
        complexity,
        functions,
        types,
        imports: extract_imports(content),
        public_symbols,
    }
}

fn strip_line_comment(line: &str) -> &str {
    let trimmed = line.trim_start();
    if trimmed.starts_with("//") || (trimmed.starts_with('#') && !trimmed.starts_with("#[")) {
        return "";
    }
    line
}
