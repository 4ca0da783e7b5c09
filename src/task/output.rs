//! Typed step payloads
//!
//! Each handler produces exactly one `StepOutput` variant. Inputs are either
//! the original request, the output of the previous finished step, or a
//! correction wrapped around whatever the step saw before.

use super::model::StepType;
use super::result::{FileChange, FileCreation, FileDeletion, FileModification};
use super::validation::ValidationResult;
use crate::capabilities::{FileAnalysis, RepositoryStats, TestCase, TestOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request details handed to the first step of every plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextHints {
    pub target_files: Vec<String>,
    pub selected_text: Option<String>,
    pub user_instructions: Option<String>,
}

/// A single fix proposed by the correction loop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionFix {
    pub description: String,
    pub file: Option<String>,
    pub replacement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepInput {
    Request {
        description: String,
        context_hints: ContextHints,
    },
    Upstream {
        output: Box<StepOutput>,
    },
    Corrected {
        previous: Option<Box<StepInput>>,
        error: String,
        fixes: Vec<CorrectionFix>,
    },
}

impl StepInput {
    /// Fixes accumulated across every correction round, oldest first
    pub fn fixes(&self) -> Vec<&CorrectionFix> {
        match self {
            StepInput::Corrected {
                previous, fixes, ..
            } => {
                let mut all = previous
                    .as_deref()
                    .map(StepInput::fixes)
                    .unwrap_or_default();
                all.extend(fixes.iter());
                all
            }
            StepInput::Request { .. } | StepInput::Upstream { .. } => Vec::new(),
        }
    }

    /// Short human-readable rendering for prompts
    pub fn describe(&self) -> String {
        match self {
            StepInput::Request {
                description,
                context_hints,
            } => {
                let mut text = format!("Request: {description}");
                if !context_hints.target_files.is_empty() {
                    text.push_str(&format!(
                        "\nTarget files: {}",
                        context_hints.target_files.join(", ")
                    ));
                }
                text
            }
            StepInput::Upstream { output } => {
                format!("Output of previous {} step", output.step_type())
            }
            StepInput::Corrected {
                previous, error, ..
            } => {
                let inner = previous
                    .as_deref()
                    .map(StepInput::describe)
                    .unwrap_or_else(|| "none".to_string());
                format!("{inner}\nPrevious error: {error}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatedComplexity {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub files: Vec<FileAnalysis>,
    /// Declared imports per target file
    pub imports: BTreeMap<String, Vec<String>>,
    pub architecture: String,
    pub naming_conventions: String,
    pub repository: RepositoryStats,
    /// Files that import each target
    pub dependents: BTreeMap<String, Vec<String>>,
    /// Mean complexity over the target files
    pub average_complexity: f64,
    pub repository_average_complexity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningOutput {
    pub summary: String,
    pub steps: Vec<String>,
    /// Files the plan expects to touch
    pub files: Vec<String>,
    pub risks: Vec<String>,
    pub prerequisites: Vec<String>,
    pub estimated_complexity: EstimatedComplexity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImplementationOutput {
    pub explanation: String,
    pub changes: Vec<FileChange>,
    pub modifications: Vec<FileModification>,
    pub creations: Vec<FileCreation>,
    pub deletions: Vec<FileDeletion>,
    /// Dry-run warnings from the edit applier
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutput {
    pub result: ValidationResult,
    pub threshold: f64,
    pub meets_threshold: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestingOutput {
    pub cases: Vec<TestCase>,
    pub outcomes: Vec<TestOutcome>,
    pub passed: usize,
    pub failed: usize,
    pub coverage_estimate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocSection {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentationOutput {
    pub sections: Vec<DocSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StepOutput {
    Analysis(AnalysisOutput),
    Planning(PlanningOutput),
    Implementation(ImplementationOutput),
    Validation(ValidationOutput),
    Testing(TestingOutput),
    Documentation(DocumentationOutput),
}

impl StepOutput {
    /// Step type whose handler produces this variant
    pub fn step_type(&self) -> StepType {
        match self {
            StepOutput::Analysis(_) => StepType::Analysis,
            StepOutput::Planning(_) => StepType::Planning,
            StepOutput::Implementation(_) => StepType::Implementation,
            StepOutput::Validation(_) => StepType::Validation,
            StepOutput::Testing(_) => StepType::Testing,
            StepOutput::Documentation(_) => StepType::Documentation,
        }
    }
}
