//! Prompt builders for the AI-backed handlers

use crate::task::{
    AnalysisOutput, CorrectionFix, ImplementationOutput, PlanningOutput, Task, TaskStep,
};
use std::fmt::Write;

/// File contents longer than this are truncated inside prompts
pub const MAX_FILE_CHARS: usize = 8000;

fn truncate(content: &str, limit: usize) -> String {
    if content.chars().count() <= limit {
        return content.to_string();
    }
    let kept: String = content.chars().take(limit).collect();
    format!("{kept}\n... (truncated)")
}

fn request_section(task: &Task) -> String {
    let mut text = format!(
        "## Task\nType: {}\nDescription: {}\n",
        task.task_type, task.description
    );
    let context = &task.context;

    if let Some(instructions) = &context.user_instructions {
        let _ = writeln!(text, "User instructions: {instructions}");
    }
    if !context.target_files.is_empty() {
        let _ = writeln!(text, "Target files: {}", context.target_files.join(", "));
    }
    if let Some(selected) = &context.selected_text {
        let _ = writeln!(text, "Selected text:\n```\n{selected}\n```");
    }
    if let Some(framework) = &context.project.framework {
        let _ = writeln!(text, "Framework: {framework}");
    }
    if !context.project.dependencies.is_empty() {
        let deps: Vec<String> = context
            .project
            .dependencies
            .iter()
            .map(|(name, version)| format!("{name} {version}"))
            .collect();
        let _ = writeln!(text, "Dependencies: {}", deps.join(", "));
    }
    text
}

fn constraints_section(task: &Task) -> String {
    let c = &task.context.constraints;
    format!(
        "## Constraints\n- Touch at most {} files\n- Preserve existing tests: {}\n- External dependencies allowed: {}\n",
        c.max_files,
        if c.preserve_existing_tests { "yes" } else { "no" },
        if c.allow_external_dependencies { "yes" } else { "no" },
    )
}

fn analysis_section(analysis: &AnalysisOutput) -> String {
    let mut text = format!(
        "## Analysis\nArchitecture: {}\nNaming conventions: {}\nRepository: {} files, {} lines, average complexity {:.1}\n",
        analysis.architecture,
        analysis.naming_conventions,
        analysis.repository.total_files,
        analysis.repository.total_lines,
        analysis.repository_average_complexity,
    );
    for file in &analysis.files {
        let _ = writeln!(
            text,
            "- {} ({}, {} lines, complexity {}, functions: {})",
            file.path,
            file.language,
            file.lines,
            file.complexity,
            if file.functions.is_empty() {
                "none".to_string()
            } else {
                file.functions.join(", ")
            }
        );
        if let Some(dependents) = analysis.dependents.get(&file.path) {
            if !dependents.is_empty() {
                let _ = writeln!(text, "  imported by: {}", dependents.join(", "));
            }
        }
    }
    text
}

fn plan_section(plan: &PlanningOutput) -> String {
    let mut text = format!("## Plan\n{}\n", plan.summary);
    for (i, step) in plan.steps.iter().enumerate() {
        let _ = writeln!(text, "{}. {step}", i + 1);
    }
    if !plan.risks.is_empty() {
        let _ = writeln!(text, "Risks: {}", plan.risks.join("; "));
    }
    text
}

fn fixes_section(fixes: &[&CorrectionFix]) -> String {
    if fixes.is_empty() {
        return String::new();
    }
    let mut text = "## Corrections from previous attempts\n".to_string();
    for fix in fixes {
        let _ = write!(text, "- {}", fix.description);
        if let Some(file) = &fix.file {
            let _ = write!(text, " ({file})");
        }
        text.push('\n');
        if let Some(replacement) = &fix.replacement {
            let _ = writeln!(text, "```\n{replacement}\n```");
        }
    }
    text
}

fn step_fixes(step: &TaskStep) -> Vec<&CorrectionFix> {
    step.input.as_ref().map(|input| input.fixes()).unwrap_or_default()
}

pub fn planning(task: &Task, step: &TaskStep, analysis: &AnalysisOutput) -> String {
    format!(
        "You are planning a change to a software repository.\n\n{}\n{}\n{}\n{}\n\
         Respond with JSON: {{\"summary\": string, \"steps\": [string], \"files\": [string], \
         \"risks\": [string], \"prerequisites\": [string], \"complexity\": \"low\" | \"medium\" | \"high\"}}\n",
        request_section(task),
        constraints_section(task),
        analysis_section(analysis),
        fixes_section(&step_fixes(step)),
    )
}

/// Implementation prompt; `files` are (path, current content) pairs for the targets
pub fn implementation(
    task: &Task,
    step: &TaskStep,
    analysis: Option<&AnalysisOutput>,
    plan: Option<&PlanningOutput>,
    previous: Option<&ImplementationOutput>,
    files: &[(String, Option<String>)],
) -> String {
    let mut text = format!(
        "You are implementing a change to a software repository.\nStep: {}\n\n{}\n{}\n",
        step.description,
        request_section(task),
        constraints_section(task),
    );

    if let Some(analysis) = analysis {
        text.push_str(&analysis_section(analysis));
        text.push('\n');
    }
    if let Some(plan) = plan {
        text.push_str(&plan_section(plan));
        text.push('\n');
    }
    if let Some(previous) = previous {
        text.push_str("## Changes produced so far\n");
        for change in &previous.changes {
            let _ = writeln!(
                text,
                "### {}\n```\n{}\n```",
                change.path,
                truncate(change.content(), MAX_FILE_CHARS)
            );
        }
        text.push('\n');
    }

    if !files.is_empty() {
        text.push_str("## Current file contents\n");
        for (path, content) in files {
            match content {
                Some(content) => {
                    let _ = writeln!(
                        text,
                        "### {path}\n```\n{}\n```",
                        truncate(content, MAX_FILE_CHARS)
                    );
                }
                None => {
                    let _ = writeln!(text, "### {path}\n(does not exist yet)");
                }
            }
        }
        text.push('\n');
    }

    text.push_str(&fixes_section(&step_fixes(step)));
    text.push_str(
        "Respond with JSON: {\"explanation\": string, \"changes\": [{\"path\": string, \
         \"kind\": \"create\" | \"modify\" | \"delete\", \"content\": string}]}. \
         Give the complete new content of every created or modified file.\n",
    );
    text
}

pub enum DocumentationSource<'a> {
    Implementation(&'a ImplementationOutput),
    Analysis(&'a AnalysisOutput),
}

pub fn documentation(task: &Task, step: &TaskStep, source: DocumentationSource<'_>) -> String {
    let material = match source {
        DocumentationSource::Implementation(implementation) => {
            let mut text = format!("## Changes\n{}\n", implementation.explanation);
            for change in &implementation.changes {
                let _ = writeln!(
                    text,
                    "### {} ({:?})\n```\n{}\n```",
                    change.path,
                    change.kind,
                    truncate(change.content(), MAX_FILE_CHARS)
                );
            }
            text
        }
        DocumentationSource::Analysis(analysis) => analysis_section(analysis),
    };

    format!(
        "You are writing documentation.\nStep: {}\n\n{}\n{}\n{}\n\
         Respond in markdown. Start each section with a heading.\n",
        step.description,
        request_section(task),
        material,
        fixes_section(&step_fixes(step)),
    )
}

/// Correction prompt for a failed step
pub fn correction(task: &Task, step: &TaskStep, error: &str) -> String {
    let input = step
        .input
        .as_ref()
        .map(|input| input.describe())
        .unwrap_or_else(|| "none".to_string());

    format!(
        "A pipeline step failed and needs a fix.\n\n\
         Task: {}\nStep: {} ({})\nStep input:\n{}\n\nError:\n{}\n\n\
         Respond with JSON: {{\"fixes\": [{{\"description\": string, \"file\": string | null, \
         \"replacement\": string | null}}]}}\n",
        task.description, step.description, step.step_type, input, error,
    )
}
