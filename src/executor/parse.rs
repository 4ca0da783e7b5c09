//! Parsers that turn free-form AI responses into typed step payloads
//!
//! Models answer with raw JSON, JSON inside a fenced block, JSON embedded in
//! prose, or plain markdown. Every parser tries the structured forms first and
//! then falls back to a line-oriented reading.

use crate::error::PipelineError;
use crate::task::{CorrectionFix, DocSection, EstimatedComplexity, FileChangeKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

static LIST_ITEM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:\d+[.)]|[-*•])\s+(.+?)\s*$").expect("list item pattern is valid")
});

static PATH_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:#{1,6}\s*|(?i:file|path):\s*|\*\*)?`?([A-Za-z0-9_./-]+\.[A-Za-z0-9]+)`?(?:\*\*)?:?\s*$")
        .expect("path header pattern is valid")
});

/// Parse `T` from raw JSON, a fenced block, or the first embedded JSON value
pub fn extract_json<T: DeserializeOwned>(response: &str) -> Option<T> {
    if let Ok(value) = serde_json::from_str::<T>(response.trim()) {
        return Some(value);
    }

    if let Some(block) = extract_json_from_markdown(response) {
        if let Ok(value) = serde_json::from_str::<T>(&block) {
            return Some(value);
        }
    }

    find_json_values(response)
        .into_iter()
        .find_map(|candidate| serde_json::from_str::<T>(&candidate).ok())
}

/// Contents of the first ```json block, or of a bare fenced block that looks like JSON
fn extract_json_from_markdown(text: &str) -> Option<String> {
    if let Some(start) = text.find("```json") {
        let content = &text[start + 7..];
        if let Some(end) = content.find("```") {
            return Some(content[..end].trim().to_string());
        }
    }

    if let Some(start) = text.find("```") {
        let content = &text[start + 3..];
        if let Some(end) = content.find("```") {
            let candidate = content[..end].trim();
            let looks_like_json = (candidate.starts_with('{') && candidate.ends_with('}'))
                || (candidate.starts_with('[') && candidate.ends_with(']'));
            if looks_like_json {
                return Some(candidate.to_string());
            }
        }
    }

    None
}

/// Balanced `{...}` and `[...]` spans that are valid JSON, in order of appearance
fn find_json_values(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' if start.is_some() => in_string = true,
            '{' | '[' => {
                if start.is_none() {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' | ']' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        let candidate = &text[s..=i];
                        if serde_json::from_str::<Value>(candidate).is_ok() {
                            found.push(candidate.to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    found
}

/// Bulleted or numbered list items
fn list_items(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| LIST_ITEM_RE.captures(line))
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPlan {
    summary: Option<String>,
    #[serde(alias = "plan")]
    steps: Vec<Value>,
    files: Vec<String>,
    risks: Vec<String>,
    prerequisites: Vec<String>,
    #[serde(alias = "estimated_complexity")]
    complexity: Option<String>,
}

/// Plan as stated by the model, before derived risks are added
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPlan {
    pub summary: String,
    pub steps: Vec<String>,
    pub files: Vec<String>,
    pub risks: Vec<String>,
    pub prerequisites: Vec<String>,
    pub complexity: Option<EstimatedComplexity>,
}

fn parse_complexity(value: &str) -> Option<EstimatedComplexity> {
    match value.trim().to_lowercase().as_str() {
        "low" | "simple" | "trivial" => Some(EstimatedComplexity::Low),
        "medium" | "moderate" => Some(EstimatedComplexity::Medium),
        "high" | "complex" | "hard" => Some(EstimatedComplexity::High),
        _ => None,
    }
}

/// A plan step may be a bare string or an object with a description
fn step_text(step: &Value) -> Option<String> {
    let text = match step {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => ["description", "title", "step", "name"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    };
    text.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn parse_plan(response: &str) -> Result<ParsedPlan, PipelineError> {
    if let Some(raw) = extract_json::<RawPlan>(response) {
        let steps: Vec<String> = raw.steps.iter().filter_map(step_text).collect();
        if !steps.is_empty() || raw.summary.is_some() {
            return Ok(ParsedPlan {
                summary: raw
                    .summary
                    .or_else(|| steps.first().cloned())
                    .unwrap_or_default(),
                steps,
                files: raw.files,
                risks: raw.risks,
                prerequisites: raw.prerequisites,
                complexity: raw.complexity.as_deref().and_then(parse_complexity),
            });
        }
    }

    let steps = list_items(response);
    if steps.is_empty() {
        return Err(PipelineError::parse("no plan steps found in response"));
    }

    let summary = response
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !LIST_ITEM_RE.is_match(line))
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .unwrap_or_else(|| steps[0].clone());

    Ok(ParsedPlan {
        summary,
        steps,
        ..Default::default()
    })
}

/// A file change as stated by the model; kind may be left for the caller to infer
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedChange {
    pub path: String,
    pub kind: Option<FileChangeKind>,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChange {
    #[serde(alias = "file", alias = "file_path")]
    path: String,
    #[serde(default, alias = "action", alias = "type", alias = "operation")]
    kind: Option<String>,
    #[serde(default, alias = "new_content", alias = "code")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChangeSet {
    #[serde(default)]
    explanation: Option<String>,
    #[serde(alias = "files", alias = "file_changes")]
    changes: Vec<RawChange>,
}

fn parse_kind(value: &str) -> Option<FileChangeKind> {
    match value.trim().to_lowercase().as_str() {
        "create" | "add" | "new" => Some(FileChangeKind::Create),
        "modify" | "update" | "edit" | "replace" => Some(FileChangeKind::Modify),
        "delete" | "remove" => Some(FileChangeKind::Delete),
        _ => None,
    }
}

fn convert(raw: RawChange) -> ParsedChange {
    ParsedChange {
        path: raw.path.trim().trim_start_matches("./").to_string(),
        kind: raw.kind.as_deref().and_then(parse_kind),
        content: raw.content,
    }
}

/// Fenced code blocks attributed to a file path
///
/// The path comes from the block's info string (```rust:src/lib.rs or
/// ```path=src/lib.rs) or from a header line right above it.
fn fenced_file_blocks(response: &str) -> Vec<ParsedChange> {
    let mut changes = Vec::new();
    let mut pending_path: Option<String> = None;
    let mut lines = response.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if let Some(info) = trimmed.strip_prefix("```") {
            let from_info = info
                .split_once(':')
                .map(|(_, path)| path)
                .or_else(|| info.split_once("path=").map(|(_, path)| path))
                .map(|path| path.trim().to_string())
                .filter(|path| !path.is_empty());

            let mut body = Vec::new();
            for inner in lines.by_ref() {
                if inner.trim_start().starts_with("```") {
                    break;
                }
                body.push(inner);
            }

            if let Some(path) = from_info.or_else(|| pending_path.take()) {
                let mut content = body.join("\n");
                content.push('\n');
                changes.push(ParsedChange {
                    path: path.trim_start_matches("./").to_string(),
                    kind: None,
                    content: Some(content),
                });
            }
            pending_path = None;
            continue;
        }

        if let Some(caps) = PATH_HEADER_RE.captures(line) {
            pending_path = Some(caps[1].to_string());
        } else if !trimmed.is_empty() {
            pending_path = None;
        }
    }

    changes
}

/// Explanation and file changes from an implementation response
pub fn parse_file_changes(response: &str) -> Result<(String, Vec<ParsedChange>), PipelineError> {
    if let Some(set) = extract_json::<RawChangeSet>(response) {
        if !set.changes.is_empty() {
            let explanation = set.explanation.unwrap_or_default();
            return Ok((explanation, set.changes.into_iter().map(convert).collect()));
        }
    }

    if let Some(list) = extract_json::<Vec<RawChange>>(response) {
        if !list.is_empty() {
            return Ok((String::new(), list.into_iter().map(convert).collect()));
        }
    }

    let blocks = fenced_file_blocks(response);
    if blocks.is_empty() {
        return Err(PipelineError::parse("no file changes found in response"));
    }

    let explanation = response
        .lines()
        .map(str::trim)
        .take_while(|line| !line.starts_with("```"))
        .filter(|line| !line.is_empty() && !PATH_HEADER_RE.is_match(line))
        .collect::<Vec<_>>()
        .join(" ");

    Ok((explanation, blocks))
}

#[derive(Debug, Deserialize)]
struct RawFixes {
    #[serde(alias = "corrections")]
    fixes: Vec<Value>,
}

fn fix_from_value(value: &Value) -> Option<CorrectionFix> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(CorrectionFix {
            description: s.trim().to_string(),
            ..Default::default()
        }),
        Value::Object(_) => serde_json::from_value::<CorrectionFix>(value.clone())
            .ok()
            .filter(|fix| !fix.description.trim().is_empty() || fix.replacement.is_some()),
        _ => None,
    }
}

/// Fixes proposed in a correction response
pub fn parse_fixes(response: &str) -> Result<Vec<CorrectionFix>, PipelineError> {
    let values = extract_json::<RawFixes>(response)
        .map(|raw| raw.fixes)
        .or_else(|| extract_json::<Vec<Value>>(response));

    if let Some(values) = values {
        let fixes: Vec<CorrectionFix> = values.iter().filter_map(fix_from_value).collect();
        if !fixes.is_empty() {
            return Ok(fixes);
        }
    }

    let fixes: Vec<CorrectionFix> = list_items(response)
        .into_iter()
        .map(|description| CorrectionFix {
            description,
            ..Default::default()
        })
        .collect();

    if fixes.is_empty() {
        let text = response.trim();
        if text.is_empty() {
            return Err(PipelineError::parse("no fixes found in response"));
        }
        return Ok(vec![CorrectionFix {
            description: text.to_string(),
            ..Default::default()
        }]);
    }

    Ok(fixes)
}

/// Markdown split on headings; text before the first heading becomes an overview
pub fn parse_doc_sections(response: &str) -> Result<Vec<DocSection>, PipelineError> {
    let mut sections = Vec::new();
    let mut title: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();
    let mut in_fence = false;

    let flush = |title: Option<String>, body: &mut Vec<&str>, sections: &mut Vec<DocSection>| {
        let content = body.join("\n").trim().to_string();
        body.clear();
        match title {
            Some(title) => sections.push(DocSection { title, content }),
            None if !content.is_empty() => sections.push(DocSection {
                title: "Overview".to_string(),
                content,
            }),
            None => {}
        }
    };

    for line in response.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        let heading = (!in_fence)
            .then(|| line.strip_prefix('#'))
            .flatten()
            .map(|rest| rest.trim_start_matches('#').trim())
            .filter(|rest| !rest.is_empty());

        match heading {
            Some(text) => {
                flush(title.take(), &mut body, &mut sections);
                title = Some(text.to_string());
            }
            None => body.push(line),
        }
    }
    flush(title, &mut body, &mut sections);

    if sections.is_empty() {
        return Err(PipelineError::parse("documentation response was empty"));
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plan_from_raw_json() {
        let response = r#"{"summary": "Add a cache", "steps": ["Create module", {"description": "Wire it in"}], "files": ["src/cache.rs"], "complexity": "high"}"#;
        let plan = parse_plan(response).unwrap();

        assert_eq!(plan.summary, "Add a cache");
        assert_eq!(plan.steps, vec!["Create module", "Wire it in"]);
        assert_eq!(plan.files, vec!["src/cache.rs"]);
        assert_eq!(plan.complexity, Some(EstimatedComplexity::High));
    }

    #[test]
    fn test_plan_from_fenced_json() {
        let response = "Here is the plan:\n\n```json\n{\"summary\": \"Refactor\", \"steps\": [\"Extract fn\"]}\n```\nDone.";
        let plan = parse_plan(response).unwrap();
        assert_eq!(plan.summary, "Refactor");
        assert_eq!(plan.complexity, None);
    }

    #[test]
    fn test_plan_from_numbered_list() {
        let response = "## Plan for the cache\n\n1. Create the module\n2) Add tests\n- Update docs\n";
        let plan = parse_plan(response).unwrap();

        assert_eq!(plan.summary, "Plan for the cache");
        assert_eq!(plan.steps, vec!["Create the module", "Add tests", "Update docs"]);
    }

    #[test]
    fn test_plan_without_steps_fails() {
        let err = parse_plan("I cannot help with that.").unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
    }

    #[test]
    fn test_changes_from_embedded_json() {
        let response = r#"Sure. {"explanation": "adds fn", "changes": [{"path": "./src/a.rs", "action": "create", "content": "fn a() {}\n"}, {"file": "src/old.rs", "type": "delete"}]} Hope that helps."#;
        let (explanation, changes) = parse_file_changes(response).unwrap();

        assert_eq!(explanation, "adds fn");
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].path, "src/a.rs");
        assert_eq!(changes[0].kind, Some(FileChangeKind::Create));
        assert_eq!(changes[1].kind, Some(FileChangeKind::Delete));
        assert!(changes[1].content.is_none());
    }

    #[test]
    fn test_changes_from_json_array() {
        let response = r#"[{"path": "src/b.rs", "content": "fn b() {}"}]"#;
        let (_, changes) = parse_file_changes(response).unwrap();
        assert_eq!(changes[0].kind, None);
    }

    #[test]
    fn test_changes_from_fenced_blocks() {
        let response = "Updated the cache.\n\n### src/cache.rs\n```rust\npub struct Cache;\n```\n\n```rust:src/lib.rs\npub mod cache;\n```\n\n```text\nnot a file\n```\n";
        let (explanation, changes) = parse_file_changes(response).unwrap();

        assert_eq!(explanation, "Updated the cache.");
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].path, "src/cache.rs");
        assert_eq!(changes[0].content.as_deref(), Some("pub struct Cache;\n"));
        assert_eq!(changes[1].path, "src/lib.rs");
    }

    #[test]
    fn test_no_changes_is_parse_error() {
        assert!(parse_file_changes("Nothing to do here.").is_err());
    }

    #[test]
    fn test_fixes_from_json_and_list() {
        let json = r#"{"fixes": [{"description": "Use modify", "file": "src/a.rs"}, "Return valid JSON"]}"#;
        let fixes = parse_fixes(json).unwrap();
        assert_eq!(fixes.len(), 2);
        assert_eq!(fixes[0].file.as_deref(), Some("src/a.rs"));
        assert_eq!(fixes[1].description, "Return valid JSON");

        let list = parse_fixes("- Close the brace\n- Rename the fn\n").unwrap();
        assert_eq!(list.len(), 2);

        let prose = parse_fixes("Create the file instead of modifying it.").unwrap();
        assert_eq!(prose[0].description, "Create the file instead of modifying it.");

        assert!(parse_fixes("   ").is_err());
    }

    #[test]
    fn test_doc_sections() {
        let response = "Intro text.\n\n# Usage\nCall it.\n\n```bash\n# not a heading\n```\n## Errors\nNone.\n";
        let sections = parse_doc_sections(response).unwrap();

        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Overview", "Usage", "Errors"]);
        assert!(sections[1].content.contains("# not a heading"));
        assert_eq!(sections[2].content, "None.");
    }

    #[test]
    fn test_empty_documentation_fails() {
        assert!(parse_doc_sections("\n\n").is_err());
    }

    proptest! {
        #[test]
        fn extract_json_never_panics(response in ".{0,200}") {
            let _ = extract_json::<serde_json::Value>(&response);
            let _ = parse_doc_sections(&response);
        }

        #[test]
        fn embedded_object_is_found(prefix in "[a-zA-Z ]{0,20}", n in 0u32..1000) {
            let response = format!("{prefix} {{\"n\": {n}}} and some trailing prose");
            let value: serde_json::Value = extract_json(&response).unwrap();
            prop_assert_eq!(value["n"].as_u64(), Some(u64::from(n)));
        }
    }
}
