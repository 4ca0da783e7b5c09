//! Repository index over a directory tree on disk

use super::index::{analyze_source, language_for, FileAnalysis, RepositoryIndex, RepositoryStats};
use crate::error::PipelineError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

const SKIPPED_DIRS: &[&str] = &[
    "target",
    "node_modules",
    "dist",
    "build",
    "vendor",
    "__pycache__",
];

const SOURCE_LANGUAGES: &[&str] = &[
    "rust",
    "typescript",
    "javascript",
    "python",
    "go",
    "java",
    "kotlin",
    "c",
    "cpp",
];

/// Snapshot of every source file below a root, analysed at scan time
pub struct WorkspaceIndex {
    root: PathBuf,
    files: BTreeMap<String, FileAnalysis>,
    max_file_size: u64,
}

impl WorkspaceIndex {
    /// Walk `root` and analyse every recognised source file
    pub async fn scan(root: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let root = root.into();
        let max_file_size = 1024 * 1024;
        let mut files = BTreeMap::new();
        let mut pending = vec![root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| {
                PipelineError::repository_index(format!("cannot read {}: {e}", dir.display()))
            })?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| PipelineError::repository_index(e.to_string()))?
            {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| PipelineError::repository_index(e.to_string()))?;

                if file_type.is_dir() {
                    if !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_str()) {
                        pending.push(path);
                    }
                    continue;
                }

                let Some(relative) = relative_path(&root, &path) else {
                    continue;
                };
                if !SOURCE_LANGUAGES.contains(&language_for(&relative)) {
                    continue;
                }

                let metadata = entry
                    .metadata()
                    .await
                    .map_err(|e| PipelineError::repository_index(e.to_string()))?;
                if metadata.len() > max_file_size {
                    debug!(path = %relative, size = metadata.len(), "Skipping oversized file");
                    continue;
                }

                // Non UTF-8 files are not source we can reason about
                if let Ok(content) = tokio::fs::read_to_string(&path).await {
                    files.insert(relative.clone(), analyze_source(&relative, &content));
                }
            }
        }

        info!(root = %root.display(), files = files.len(), "Workspace indexed");

        Ok(Self {
            root,
            files,
            max_file_size,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, PipelineError> {
        let relative = Path::new(path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(PipelineError::repository_index(format!(
                "path escapes the workspace: {path}"
            )));
        }
        Ok(self.root.join(relative))
    }

    /// Module name other files use to import `path`
    fn module_name(path: &str) -> Option<String> {
        let path = Path::new(path);
        let stem = path.file_stem()?.to_str()?;
        if matches!(stem, "mod" | "index" | "lib" | "__init__" | "main") {
            return path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .map(str::to_string);
        }
        Some(stem.to_string())
    }

    fn architecture_from(files: &BTreeMap<String, FileAnalysis>) -> String {
        if files.is_empty() {
            return "Empty workspace: no source files indexed".to_string();
        }

        let mut languages: BTreeMap<&str, usize> = BTreeMap::new();
        let mut top_level: BTreeMap<String, usize> = BTreeMap::new();
        let mut dir_names: Vec<String> = Vec::new();

        for (path, analysis) in files {
            *languages.entry(analysis.language.as_str()).or_default() += 1;
            let mut components = Path::new(path).components();
            if let (Some(first), Some(_)) = (components.next(), components.next()) {
                *top_level
                    .entry(first.as_os_str().to_string_lossy().to_string())
                    .or_default() += 1;
            }
            dir_names.extend(
                Path::new(path)
                    .parent()
                    .into_iter()
                    .flat_map(|p| p.components())
                    .map(|c| c.as_os_str().to_string_lossy().to_lowercase()),
            );
        }

        let has_dir = |names: &[&str]| names.iter().any(|n| dir_names.iter().any(|d| d == n));
        let mut patterns = Vec::new();
        if has_dir(&["models", "model"]) && has_dir(&["controllers", "controller"]) {
            patterns.push("model-view-controller");
        }
        if has_dir(&["services", "service"]) && has_dir(&["repositories", "repository", "store"]) {
            patterns.push("layered services");
        }
        if has_dir(&["components"]) {
            patterns.push("component-based UI");
        }
        if has_dir(&["handlers", "routes", "api"]) {
            patterns.push("request handlers");
        }
        if has_dir(&["tests", "test", "__tests__"]) {
            patterns.push("dedicated test tree");
        }
        if patterns.is_empty() {
            patterns.push("flat module layout");
        }

        let languages = languages
            .iter()
            .map(|(lang, count)| format!("{lang} ({count} files)"))
            .collect::<Vec<_>>()
            .join(", ");
        let modules = top_level.keys().cloned().collect::<Vec<_>>().join(", ");

        format!(
            "Languages: {languages}. Top-level directories: {}. Patterns: {}.",
            if modules.is_empty() { "none" } else { modules.as_str() },
            patterns.join(", ")
        )
    }

    fn naming_from(files: &BTreeMap<String, FileAnalysis>) -> String {
        let functions: Vec<&str> = files
            .values()
            .flat_map(|f| f.functions.iter().map(String::as_str))
            .collect();
        let types: Vec<&str> = files
            .values()
            .flat_map(|f| f.types.iter().map(String::as_str))
            .collect();
        let file_names: Vec<String> = files
            .keys()
            .filter_map(|p| Path::new(p).file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();

        format!(
            "Functions: {}. Types: {}. Files: {}.",
            dominant_case(functions.iter().copied()),
            dominant_case(types.iter().copied()),
            dominant_case(file_names.iter().map(String::as_str)),
        )
    }
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    Some(parts.join("/"))
}

/// Case style of an identifier
pub fn case_style(name: &str) -> &'static str {
    let has_upper = name.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = name.chars().any(|c| c.is_ascii_lowercase());
    let starts_upper = name.chars().next().is_some_and(|c| c.is_ascii_uppercase());

    if name.contains('-') {
        "kebab-case"
    } else if name.contains('_') && !has_lower {
        "SCREAMING_SNAKE_CASE"
    } else if name.contains('_') || (!has_upper && has_lower) {
        "snake_case"
    } else if starts_upper {
        "PascalCase"
    } else if has_upper {
        "camelCase"
    } else {
        "mixed"
    }
}

fn dominant_case<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut total = 0usize;
    for name in names {
        *counts.entry(case_style(name)).or_default() += 1;
        total += 1;
    }

    match counts.into_iter().max_by_key(|(_, count)| *count) {
        Some((style, count)) => format!("{style} ({}%)", count * 100 / total),
        None => "no samples".to_string(),
    }
}

#[async_trait]
impl RepositoryIndex for WorkspaceIndex {
    async fn analyze_file(&self, path: &str) -> Result<FileAnalysis, PipelineError> {
        if let Some(analysis) = self.files.get(path) {
            return Ok(analysis.clone());
        }

        match self.read_file(path).await? {
            Some(content) => Ok(analyze_source(path, &content)),
            None => Err(PipelineError::repository_index(format!(
                "file not found: {path}"
            ))),
        }
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>, PipelineError> {
        let full = self.resolve(path)?;
        match tokio::fs::metadata(&full).await {
            Ok(metadata) if metadata.is_file() => {
                if metadata.len() > self.max_file_size {
                    return Err(PipelineError::repository_index(format!(
                        "file too large: {path} ({} bytes, max {})",
                        metadata.len(),
                        self.max_file_size
                    )));
                }
                tokio::fs::read_to_string(&full)
                    .await
                    .map(Some)
                    .map_err(|e| PipelineError::repository_index(format!("{path}: {e}")))
            }
            Ok(_) => Err(PipelineError::repository_index(format!(
                "not a file: {path}"
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::repository_index(format!("{path}: {e}"))),
        }
    }

    async fn architecture_summary(&self) -> Result<String, PipelineError> {
        Ok(Self::architecture_from(&self.files))
    }

    async fn naming_conventions(&self) -> Result<String, PipelineError> {
        Ok(Self::naming_from(&self.files))
    }

    async fn stats(&self) -> Result<RepositoryStats, PipelineError> {
        let total_files = self.files.len();
        let total_complexity: u64 = self.files.values().map(|f| u64::from(f.complexity)).sum();

        Ok(RepositoryStats {
            total_files,
            total_lines: self.files.values().map(|f| f.lines).sum(),
            total_elements: self.files.values().map(FileAnalysis::element_count).sum(),
            average_complexity: if total_files == 0 {
                0.0
            } else {
                total_complexity as f64 / total_files as f64
            },
        })
    }

    async fn dependents_of(&self, path: &str) -> Result<Vec<String>, PipelineError> {
        let Some(module) = Self::module_name(path) else {
            return Ok(Vec::new());
        };

        Ok(self
            .files
            .iter()
            .filter(|(other, _)| other.as_str() != path)
            .filter(|(_, analysis)| {
                analysis.imports.iter().any(|import| {
                    import
                        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
                        .any(|token| token == module)
                })
            })
            .map(|(other, _)| other.clone())
            .collect())
    }
}
