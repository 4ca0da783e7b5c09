//! The six step handlers
//!
//! Each handler reads what it needs from the task (earlier outputs are looked
//! up by step type) and returns its typed output. Errors are returned, never
//! recorded here; `StepExecutor::run_step` owns the step's status.

use super::impact::{self, is_test_path};
use super::parse::{self, ParsedChange};
use super::prompts::{self, DocumentationSource};
use super::StepExecutor;
use crate::capabilities::{analyze_source, RepositoryIndex, TestCase, TestKind};
use crate::config::PipelineConfiguration;
use crate::error::{PipelineError, PipelineResult};
use crate::task::{
    diff_lines, AnalysisOutput, DocumentationOutput, EstimatedComplexity, FileChange,
    FileChangeKind, FileCreation, FileDeletion, FileModification, ImplementationOutput,
    PlanningOutput, StepType, Task, TaskConstraints, TaskStep, TestingOutput, ValidationOutput,
};
use crate::validation::validate_changes;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

/// Target complexity above which planning flags a risk
pub const HIGH_COMPLEXITY: u32 = 15;

/// Dependency manifests guarded by `allow_external_dependencies`
const MANIFESTS: [&str; 7] = [
    "Cargo.toml",
    "package.json",
    "requirements.txt",
    "pyproject.toml",
    "go.mod",
    "pom.xml",
    "build.gradle",
];

const DEPENDENCY_WORDS: [&str; 6] = [
    "dependency",
    "dependencies",
    "install",
    "new crate",
    "new package",
    "third-party",
];

fn is_manifest(path: &str) -> bool {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|name| MANIFESTS.contains(&name))
        .unwrap_or(false)
}

fn estimate_complexity(analysis: &AnalysisOutput, planned_files: usize) -> EstimatedComplexity {
    let files = planned_files.max(analysis.files.len());
    if analysis.average_complexity > f64::from(HIGH_COMPLEXITY) || files > 5 {
        EstimatedComplexity::High
    } else if analysis.average_complexity > 8.0 || files > 2 {
        EstimatedComplexity::Medium
    } else {
        EstimatedComplexity::Low
    }
}

fn derived_risks(
    analysis: &AnalysisOutput,
    plan: &parse::ParsedPlan,
    constraints: &TaskConstraints,
) -> Vec<String> {
    let mut risks = Vec::new();

    for file in analysis.files.iter().filter(|f| f.complexity > HIGH_COMPLEXITY) {
        risks.push(format!(
            "High complexity in {} ({}), changes may have wide effects",
            file.path, file.complexity
        ));
    }

    if plan.files.len() > constraints.max_files {
        risks.push(format!(
            "Plan touches {} files, more than the limit of {}",
            plan.files.len(),
            constraints.max_files
        ));
    }

    if !constraints.allow_external_dependencies {
        let mentions_dependencies = plan
            .steps
            .iter()
            .chain(plan.prerequisites.iter())
            .any(|text| {
                let lower = text.to_lowercase();
                DEPENDENCY_WORDS.iter().any(|word| lower.contains(word))
            });
        if mentions_dependencies || plan.files.iter().any(|f| is_manifest(f)) {
            risks.push(
                "Plan may need external dependencies, which this task does not allow".to_string(),
            );
        }
    }

    risks
}

/// Enforce the task constraints on a resolved change set
fn check_constraints(
    constraints: &TaskConstraints,
    changes: &[(FileChange, Option<String>)],
) -> PipelineResult<()> {
    let touched: HashSet<&str> = changes.iter().map(|(c, _)| c.path.as_str()).collect();
    if touched.len() > constraints.max_files {
        return Err(PipelineError::constraint_violation(format!(
            "change set touches {} files, the limit is {}",
            touched.len(),
            constraints.max_files
        )));
    }

    for (change, original) in changes {
        if constraints.preserve_existing_tests
            && change.kind == FileChangeKind::Delete
            && original.is_some()
            && is_test_path(&change.path)
        {
            return Err(PipelineError::constraint_violation(format!(
                "deleting existing test file {} is not allowed",
                change.path
            )));
        }

        if !constraints.allow_external_dependencies
            && change.kind != FileChangeKind::Delete
            && is_manifest(&change.path)
        {
            let before: HashSet<&str> = original
                .as_deref()
                .map(|o| o.lines().map(str::trim).collect())
                .unwrap_or_default();
            let adds_lines = change
                .content()
                .lines()
                .map(str::trim)
                .any(|line| !line.is_empty() && !before.contains(line));
            if adds_lines {
                return Err(PipelineError::constraint_violation(format!(
                    "{} would gain new entries but external dependencies are not allowed",
                    change.path
                )));
            }
        }
    }

    Ok(())
}

fn test_case_for(change: &FileChange) -> TestCase {
    let lower = change.path.to_lowercase();
    let kind = if lower.starts_with("tests/")
        || lower.contains("/tests/")
        || lower.contains("integration")
        || lower.contains("e2e")
    {
        TestKind::Integration
    } else {
        TestKind::Unit
    };

    let name = Path::new(&change.path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&change.path)
        .to_string();

    TestCase {
        name,
        file: change.path.clone(),
        kind,
    }
}

impl StepExecutor {
    pub(super) async fn analyze(&self, task: &Task) -> PipelineResult<AnalysisOutput> {
        let index = self.index_for(task);
        let mut files = Vec::with_capacity(task.context.target_files.len());
        let mut imports = BTreeMap::new();
        let mut dependents = BTreeMap::new();

        for path in &task.context.target_files {
            let analysis = match index.read_file(path).await? {
                Some(_) => index.analyze_file(path).await?,
                None => {
                    debug!(path = %path, "Target file does not exist yet");
                    analyze_source(path, "")
                }
            };
            imports.insert(path.clone(), analysis.imports.clone());
            dependents.insert(path.clone(), index.dependents_of(path).await?);
            files.push(analysis);
        }

        let architecture = index.architecture_summary().await?;
        let naming_conventions = index.naming_conventions().await?;
        let repository = index.stats().await?;

        let average_complexity = if files.is_empty() {
            0.0
        } else {
            files.iter().map(|f| f64::from(f.complexity)).sum::<f64>() / files.len() as f64
        };

        debug!(
            targets = files.len(),
            average_complexity,
            repository_files = repository.total_files,
            "Analysis gathered"
        );

        Ok(AnalysisOutput {
            files,
            imports,
            architecture,
            naming_conventions,
            repository_average_complexity: repository.average_complexity,
            repository,
            dependents,
            average_complexity,
        })
    }

    pub(super) async fn plan(
        &self,
        task: &Task,
        step: &TaskStep,
    ) -> PipelineResult<PlanningOutput> {
        let analysis = task.last_analysis().ok_or(PipelineError::MissingOutput {
            step_type: StepType::Analysis,
        })?;

        let prompt = prompts::planning(task, step, analysis);
        let response = self.ai.complete(&prompt).await?;
        let parsed = parse::parse_plan(&response)?;

        let mut risks = parsed.risks.clone();
        for risk in derived_risks(analysis, &parsed, &task.context.constraints) {
            if !risks.contains(&risk) {
                risks.push(risk);
            }
        }
        let estimated_complexity = parsed
            .complexity
            .unwrap_or_else(|| estimate_complexity(analysis, parsed.files.len()));

        Ok(PlanningOutput {
            summary: parsed.summary,
            steps: parsed.steps,
            files: parsed.files,
            risks,
            prerequisites: parsed.prerequisites,
            estimated_complexity,
        })
    }

    /// Turn parsed changes into concrete edits against the current files
    async fn resolve_changes(
        &self,
        index: &dyn RepositoryIndex,
        parsed: Vec<ParsedChange>,
    ) -> PipelineResult<Vec<(FileChange, Option<String>)>> {
        let mut resolved = Vec::with_capacity(parsed.len());

        for change in parsed {
            if change.path.is_empty() {
                return Err(PipelineError::parse("file change without a path"));
            }
            let original = index.read_file(&change.path).await?;
            let kind = change.kind.unwrap_or(if original.is_some() {
                FileChangeKind::Modify
            } else {
                FileChangeKind::Create
            });

            let file_change = match kind {
                FileChangeKind::Delete => FileChange::delete(&change.path),
                FileChangeKind::Create | FileChangeKind::Modify => {
                    let content = change.content.ok_or_else(|| {
                        PipelineError::parse(format!("change to {} has no content", change.path))
                    })?;
                    if kind == FileChangeKind::Create {
                        FileChange::create(&change.path, content)
                    } else {
                        FileChange::modify(&change.path, content)
                    }
                }
            };

            let expected_before = match kind {
                FileChangeKind::Create => None,
                FileChangeKind::Modify | FileChangeKind::Delete => original.clone(),
            };

            resolved.push((
                FileChange {
                    expected_before,
                    ..file_change
                },
                original,
            ));
        }

        Ok(resolved)
    }

    pub(super) async fn implement(
        &self,
        task: &Task,
        step: &TaskStep,
    ) -> PipelineResult<ImplementationOutput> {
        let index = self.index_for(task);

        let mut files = Vec::with_capacity(task.context.target_files.len());
        for path in &task.context.target_files {
            files.push((path.clone(), index.read_file(path).await?));
        }

        let prompt = prompts::implementation(
            task,
            step,
            task.last_analysis(),
            task.last_plan(),
            task.last_implementation(),
            &files,
        );
        let response = self.ai.complete(&prompt).await?;
        let (explanation, parsed) = parse::parse_file_changes(&response)?;

        let resolved = self.resolve_changes(index.as_ref(), parsed).await?;
        check_constraints(&task.context.constraints, &resolved)?;

        let changes: Vec<FileChange> = resolved.iter().map(|(c, _)| c.clone()).collect();
        let report = self.applier.apply(&changes, true).await?;
        if !report.success {
            return Err(PipelineError::Conflict {
                conflicts: report.conflicts,
            });
        }

        let reason = if explanation.is_empty() {
            step.description.clone()
        } else {
            explanation.clone()
        };

        let mut output = ImplementationOutput {
            explanation,
            changes: changes.clone(),
            warnings: report.warnings,
            ..Default::default()
        };

        for (change, original) in resolved {
            match change.kind {
                FileChangeKind::Create => {
                    let content = change.content().to_string();
                    output.creations.push(FileCreation {
                        changes: diff_lines("", &content, &reason),
                        impact: impact::assess(
                            &change.path,
                            None,
                            Some(content.as_str()),
                            Vec::new(),
                            &changes,
                        ),
                        path: change.path,
                        content,
                    });
                }
                FileChangeKind::Modify => {
                    let dependents = self.dependents(index.as_ref(), &change.path).await;
                    let before = original.unwrap_or_default();
                    let after = change.content().to_string();
                    output.modifications.push(FileModification {
                        changes: diff_lines(&before, &after, &reason),
                        impact: impact::assess(
                            &change.path,
                            Some(before.as_str()),
                            Some(after.as_str()),
                            dependents,
                            &changes,
                        ),
                        path: change.path,
                        original_content: before,
                        new_content: after,
                    });
                }
                FileChangeKind::Delete => {
                    output.deletions.push(FileDeletion {
                        path: change.path,
                        reason: reason.clone(),
                    });
                }
            }
        }

        debug!(
            modifications = output.modifications.len(),
            creations = output.creations.len(),
            deletions = output.deletions.len(),
            warnings = output.warnings.len(),
            "Implementation dry run passed"
        );

        Ok(output)
    }

    /// Dependents for impact reporting; an index failure only loses detail
    async fn dependents(&self, index: &dyn RepositoryIndex, path: &str) -> Vec<String> {
        index.dependents_of(path).await.unwrap_or_else(|error| {
            warn!(path, error = %error, "Could not look up dependents");
            Vec::new()
        })
    }

    pub(super) async fn validate(
        &self,
        task: &Task,
        config: &PipelineConfiguration,
    ) -> PipelineResult<ValidationOutput> {
        let implementation = task.last_implementation().ok_or(PipelineError::MissingOutput {
            step_type: StepType::Implementation,
        })?;

        let result = validate_changes(self.validator.as_ref(), &implementation.changes).await;
        let threshold = config.validation_threshold;

        Ok(ValidationOutput {
            meets_threshold: result.confidence >= threshold,
            result,
            threshold,
        })
    }

    pub(super) async fn test(&self, task: &Task) -> PipelineResult<TestingOutput> {
        let implementation = task.last_implementation().ok_or(PipelineError::MissingOutput {
            step_type: StepType::Implementation,
        })?;

        let cases: Vec<TestCase> = implementation
            .changes
            .iter()
            .filter(|change| change.kind != FileChangeKind::Delete)
            .map(test_case_for)
            .collect();

        let outcomes = match &self.test_runner {
            Some(runner) if !cases.is_empty() => runner.run(&cases).await?,
            Some(_) => Vec::new(),
            None => {
                debug!(cases = cases.len(), "No test runner configured");
                Vec::new()
            }
        };

        let passed = outcomes.iter().filter(|o| o.passed).count();
        let failed = outcomes.len() - passed;
        let coverage_estimate = if cases.is_empty() {
            0.0
        } else {
            passed as f64 / cases.len() as f64
        };

        Ok(TestingOutput {
            cases,
            outcomes,
            passed,
            failed,
            coverage_estimate,
        })
    }

    pub(super) async fn document(
        &self,
        task: &Task,
        step: &TaskStep,
    ) -> PipelineResult<DocumentationOutput> {
        let source = match (task.last_implementation(), task.last_analysis()) {
            (Some(implementation), _) => DocumentationSource::Implementation(implementation),
            (None, Some(analysis)) => DocumentationSource::Analysis(analysis),
            (None, None) => {
                return Err(PipelineError::MissingOutput {
                    step_type: StepType::Implementation,
                })
            }
        };

        let prompt = prompts::documentation(task, step, source);
        let response = self.ai.complete(&prompt).await?;
        let sections = parse::parse_doc_sections(&response)?;

        Ok(DocumentationOutput { sections })
    }
}
