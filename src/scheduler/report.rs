//! Task result assembly for completed tasks

use crate::task::{
    lines_changed, FileChangeKind, StepStatus, StepType, Task, TaskMetrics, TaskResult,
};
use std::collections::HashSet;

/// Each performance finding costs this much of the performance score
const PERFORMANCE_PENALTY: f64 = 0.1;

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

fn recommendations(task: &Task) -> Vec<String> {
    let mut recommendations = Vec::new();

    if let Some(validation) = task.last_validation() {
        for suggestion in &validation.result.suggestions {
            push_unique(&mut recommendations, suggestion.clone());
        }
        if !validation.meets_threshold {
            push_unique(
                &mut recommendations,
                format!(
                    "Validation confidence {:.2} is below the threshold {:.2}; review the changes before applying them",
                    validation.result.confidence, validation.threshold
                ),
            );
        }
    }

    let validation_skipped = task
        .steps
        .iter()
        .any(|s| s.step_type == StepType::Validation && s.status == StepStatus::Skipped);
    if validation_skipped && task.context.constraints.require_validation {
        push_unique(
            &mut recommendations,
            "Validation was required but skipped; review the changes manually".to_string(),
        );
    }

    if let Some(plan) = task.last_plan() {
        for risk in &plan.risks {
            push_unique(&mut recommendations, format!("Risk: {risk}"));
        }
    }

    if let Some(implementation) = task.last_implementation() {
        let breaking = implementation
            .modifications
            .iter()
            .flat_map(|m| m.impact.breaking_changes.iter());
        for change in breaking {
            push_unique(
                &mut recommendations,
                format!("{} ({})", change.description, change.mitigation),
            );
        }
    }

    if let Some(testing) = task.last_testing() {
        for outcome in testing.outcomes.iter().filter(|o| !o.passed) {
            push_unique(
                &mut recommendations,
                format!("Fix failing test {}", outcome.name),
            );
        }
    }

    recommendations
}

fn summary(task: &Task) -> String {
    let ran = task
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Completed)
        .count();
    let mut text = format!(
        "{} task completed ({ran} of {} steps run)",
        task.task_type,
        task.steps.len()
    );

    if let Some(implementation) = task.last_implementation() {
        text.push_str(&format!(
            ": {} created, {} modified, {} deleted",
            implementation.creations.len(),
            implementation.modifications.len(),
            implementation.deletions.len()
        ));
    } else if let Some(analysis) = task.last_analysis() {
        text.push_str(&format!(": {} files analyzed", analysis.files.len()));
    }

    if let Some(documentation) = task.last_documentation() {
        text.push_str(&format!(", {} documentation sections", documentation.sections.len()));
    }
    if let Some(plan) = task.last_plan() {
        if !plan.summary.is_empty() {
            text.push_str(&format!(". Plan: {}", plan.summary));
        }
    }
    text
}

/// Result of a task whose steps all finished
pub fn build_task_result(task: &Task, execution_time_ms: u64) -> TaskResult {
    let implementation = task.last_implementation();
    let validation = task.last_validation();

    let (modifications, creations, deletions) = implementation
        .map(|i| (i.modifications.clone(), i.creations.clone(), i.deletions.clone()))
        .unwrap_or_default();

    let deleted_lines: usize = implementation
        .map(|i| {
            i.changes
                .iter()
                .filter(|c| c.kind == FileChangeKind::Delete)
                .filter_map(|c| c.expected_before.as_deref())
                .map(|content| content.lines().count())
                .sum()
        })
        .unwrap_or(0);

    let lines = modifications
        .iter()
        .map(|m| lines_changed(&m.changes))
        .chain(creations.iter().map(|c| lines_changed(&c.changes)))
        .sum::<usize>()
        + deleted_lines;

    let files: HashSet<&str> = modifications
        .iter()
        .map(|m| m.path.as_str())
        .chain(creations.iter().map(|c| c.path.as_str()))
        .chain(deletions.iter().map(|d| d.path.as_str()))
        .collect();

    let performance_findings = validation
        .map(|v| v.result.performance_findings())
        .unwrap_or(0);

    let metrics = TaskMetrics {
        execution_time_ms,
        lines_changed: lines,
        files_affected: files.len(),
        quality_score: validation.map(|v| v.result.confidence).unwrap_or(1.0),
        complexity_score: task.last_analysis().map(|a| a.average_complexity).unwrap_or(0.0),
        performance_score: (1.0 - PERFORMANCE_PENALTY * performance_findings as f64).max(0.0),
    };

    TaskResult {
        success: true,
        summary: summary(task),
        recommendations: recommendations(task),
        modifications,
        creations,
        deletions,
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{
        diff_lines, FileChange, FileCreation, FileDeletion, ImplementationOutput, StepOutput,
        TaskContext, TaskStep, TaskType, ValidationOutput, ValidationResult, ValidationWarning,
        ValidationWarningKind,
    };

    fn completed(mut step: TaskStep, output: StepOutput) -> TaskStep {
        step.complete(output, 1);
        step
    }

    fn task_with(steps: Vec<TaskStep>) -> Task {
        Task::new(TaskType::CodeGeneration, "demo", 0, TaskContext::default(), steps)
    }

    #[test]
    fn test_metrics_without_outputs() {
        let task = task_with(Vec::new());
        let result = build_task_result(&task, 42);

        assert!(result.success);
        assert_eq!(result.metrics.execution_time_ms, 42);
        assert_eq!(result.metrics.quality_score, 1.0);
        assert_eq!(result.metrics.performance_score, 1.0);
        assert_eq!(result.metrics.files_affected, 0);
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn test_metrics_from_implementation_and_validation() {
        let implementation = ImplementationOutput {
            changes: vec![
                FileChange::create("src/a.rs", "a\nb\n"),
                FileChange {
                    expected_before: Some("x\ny\nz\n".to_string()),
                    ..FileChange::delete("src/old.rs")
                },
            ],
            creations: vec![FileCreation {
                path: "src/a.rs".to_string(),
                content: "a\nb\n".to_string(),
                changes: diff_lines("", "a\nb\n", "new"),
                impact: Default::default(),
            }],
            deletions: vec![FileDeletion {
                path: "src/old.rs".to_string(),
                reason: "unused".to_string(),
            }],
            ..Default::default()
        };

        let warning = ValidationWarning {
            kind: ValidationWarningKind::Performance,
            message: "slow".to_string(),
            file: "src/a.rs".to_string(),
            line: 1,
            column: 1,
            suggestion: None,
        };
        let result =
            ValidationResult::from_findings(Vec::new(), vec![warning.clone(), warning], Vec::new());
        let validation = ValidationOutput {
            meets_threshold: false,
            threshold: 0.9,
            result,
        };

        let task = task_with(vec![
            completed(
                TaskStep::new("implementation", StepType::Implementation, "impl"),
                StepOutput::Implementation(implementation),
            ),
            completed(
                TaskStep::new("validation", StepType::Validation, "validate"),
                StepOutput::Validation(validation),
            ),
        ]);

        let result = build_task_result(&task, 10);
        assert_eq!(result.metrics.lines_changed, 5);
        assert_eq!(result.metrics.files_affected, 2);
        assert!((result.metrics.quality_score - 0.8).abs() < 1e-9);
        assert!((result.metrics.performance_score - 0.8).abs() < 1e-9);
        assert!(result
            .recommendations
            .iter()
            .any(|r| r.contains("below the threshold 0.90")));
        assert!(result.summary.contains("1 created, 0 modified, 1 deleted"));
    }

    #[test]
    fn test_skipped_required_validation_is_recommended() {
        let mut validation = TaskStep::new("validation", StepType::Validation, "validate");
        validation.skip();
        let task = task_with(vec![validation]);

        let result = build_task_result(&task, 0);
        assert!(result.recommendations[0].contains("required but skipped"));
    }
}
