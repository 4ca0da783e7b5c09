//! Step handlers driven one step at a time through the executor


use agentic_pipeline::capabilities::{RepositoryIndex, TestRunner};
use agentic_pipeline::config::PipelineConfiguration;
use agentic_pipeline::error::ErrorKind;
use agentic_pipeline::planner;
use agentic_pipeline::task::{
    ContextHints, StepInput, StepOutput, StepStatus, StepType, Task, TaskConstraints,
    TaskContext, TaskType,
};
use agentic_pipeline::testing::{
    MockEditApplier, MockRepositoryIndex, MockTestRunner, MockValidator, PromptKind, ScriptedAi,
};
use agentic_pipeline::{Collaborators, PipelineError, StepExecutor};
use std::sync::Arc;
use test_helpers::*;

struct Harness {
    ai: ScriptedAi,
    index: MockRepositoryIndex,
    validator: MockValidator,
    applier: MockEditApplier,
    test_runner: Option<MockTestRunner>,
}

impl Harness {
    fn new(ai: ScriptedAi) -> Self {
        Self {
            ai,
            index: test_index(),
            validator: MockValidator::new(),
            applier: MockEditApplier::new(),
            test_runner: Some(MockTestRunner::passing()),
        }
    }

    fn executor(self) -> StepExecutor {
        StepExecutor::new(Collaborators {
            ai: Arc::new(self.ai),
            index: Arc::new(self.index),
            validator: Arc::new(self.validator),
            applier: Arc::new(self.applier),
            test_runner: self
                .test_runner
                .map(|runner| Arc::new(runner) as Arc<dyn TestRunner>),
        })
    }
}

/// Plans normally, then answers implementation prompts with `reply`
fn implementing(reply: String) -> ScriptedAi {
    ScriptedAi::new()
        .on(PromptKind::Planning, plan_reply())
        .on(PromptKind::Implementation, reply)
}

fn task(task_type: TaskType, files: &[&str], constraints: TaskConstraints) -> Task {
    let target_files: Vec<String> = files.iter().map(|f| f.to_string()).collect();
    let hints = ContextHints {
        target_files: target_files.clone(),
        ..Default::default()
    };
    let context = TaskContext {
        target_files,
        constraints,
        ..Default::default()
    };
    let steps = planner::plan(task_type, "Add memoization to the cache lookup", hints);
    Task::new(task_type, "Add memoization to the cache lookup", 0, context, steps)
}

/// Run steps `0..count` and fail the test on the first error
async fn run_through(executor: &StepExecutor, task: &mut Task, count: usize) {
    let config = PipelineConfiguration::default();
    for index in 0..count {
        executor.run_step(task, index, &config).await.unwrap();
    }
}

#[tokio::test]
async fn test_analysis_of_missing_file_is_empty() {
    let executor = Harness::new(happy_ai()).executor();
    let mut task = task(
        TaskType::CodeGeneration,
        &["src/cache.rs", "src/new_module.rs"],
        TaskConstraints::default(),
    );

    run_through(&executor, &mut task, 1).await;

    let analysis = task.last_analysis().unwrap();
    assert_eq!(analysis.files.len(), 2);
    assert_eq!(analysis.files[1].path, "src/new_module.rs");
    assert_eq!(analysis.files[1].lines, 0);
    assert_eq!(analysis.repository.total_files, 2);
    assert!(analysis.files[0].functions.contains(&"lookup".to_string()));
}

#[tokio::test]
async fn test_later_steps_receive_upstream_output() {
    let executor = Harness::new(happy_ai()).executor();
    let mut task = task(TaskType::CodeGeneration, &["src/cache.rs"], TaskConstraints::default());

    run_through(&executor, &mut task, 2).await;

    assert!(matches!(
        task.steps[1].input,
        Some(StepInput::Upstream { ref output }) if matches!(**output, StepOutput::Analysis(_))
    ));
    let plan = task.last_plan().unwrap();
    assert_eq!(plan.files, vec!["src/cache.rs"]);
    assert_eq!(plan.steps.len(), 2);
    assert!(task.steps[1].duration_ms < 10_000);
}

#[tokio::test]
async fn test_planning_requires_analysis() {
    let executor = Harness::new(happy_ai()).executor();
    let mut task = task(TaskType::CodeGeneration, &["src/cache.rs"], TaskConstraints::default());

    let error = executor
        .run_step(&mut task, 1, &PipelineConfiguration::default())
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        PipelineError::MissingOutput {
            step_type: StepType::Analysis
        }
    ));
    assert_eq!(task.steps[1].status, StepStatus::Failed);
    assert!(task.steps[1].error.is_some());
}

#[tokio::test]
async fn test_too_many_files_violates_constraints() {
    let reply = serde_json::json!({
        "changes": [
            {"path": "src/a.rs", "content": "pub fn a() {}\n"},
            {"path": "src/b.rs", "content": "pub fn b() {}\n"}
        ]
    })
    .to_string();
    let ai = implementing(reply);
    let executor = Harness::new(ai).executor();
    let constraints = TaskConstraints {
        max_files: 1,
        ..Default::default()
    };
    let mut task = task(TaskType::CodeGeneration, &["src/cache.rs"], constraints);

    run_through(&executor, &mut task, 2).await;
    let error = executor
        .run_step(&mut task, 2, &PipelineConfiguration::default())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::ConstraintViolation);
    assert!(error.to_string().contains("touches 2 files, the limit is 1"));
}

#[tokio::test]
async fn test_deleting_existing_tests_is_blocked() {
    let reply = serde_json::json!({
        "changes": [{"path": "tests/cache_test.rs", "action": "delete"}]
    })
    .to_string();
    let ai = implementing(reply);
    let mut harness = Harness::new(ai);
    harness.index = test_index().with_file("tests/cache_test.rs", "#[test]\nfn hit() {}\n");
    let executor = harness.executor();
    let mut task = task(TaskType::Refactoring, &["src/cache.rs"], TaskConstraints::default());

    run_through(&executor, &mut task, 2).await;
    let error = executor
        .run_step(&mut task, 2, &PipelineConfiguration::default())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::ConstraintViolation);
    assert!(error.to_string().contains("tests/cache_test.rs"));
}

#[tokio::test]
async fn test_new_dependencies_are_blocked_by_default() {
    let reply = serde_json::json!({
        "changes": [{
            "path": "Cargo.toml",
            "content": "[package]\nname = \"demo\"\n\n[dependencies]\nlru = \"0.12\"\n"
        }]
    })
    .to_string();
    let ai = implementing(reply);
    let mut harness = Harness::new(ai);
    harness.index = test_index().with_file("Cargo.toml", "[package]\nname = \"demo\"\n");
    let executor = harness.executor();
    let mut task = task(TaskType::CodeGeneration, &["src/cache.rs"], TaskConstraints::default());

    run_through(&executor, &mut task, 2).await;
    let error = executor
        .run_step(&mut task, 2, &PipelineConfiguration::default())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ConstraintViolation);
}

#[tokio::test]
async fn test_change_without_content_is_a_parse_error() {
    let reply = serde_json::json!({
        "changes": [{"path": "src/cache.rs", "action": "modify"}]
    })
    .to_string();
    let ai = implementing(reply);
    let executor = Harness::new(ai).executor();
    let mut task = task(TaskType::CodeGeneration, &["src/cache.rs"], TaskConstraints::default());

    run_through(&executor, &mut task, 2).await;
    let error = executor
        .run_step(&mut task, 2, &PipelineConfiguration::default())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Parse);
}

#[tokio::test]
async fn test_applier_conflict_fails_implementation() {
    let mut harness = Harness::new(happy_ai());
    harness.applier = MockEditApplier::new().conflict_once("src/cache.rs changed on disk");
    let executor = harness.executor();
    let mut task = task(TaskType::CodeGeneration, &["src/cache.rs"], TaskConstraints::default());

    run_through(&executor, &mut task, 2).await;
    let error = executor
        .run_step(&mut task, 2, &PipelineConfiguration::default())
        .await
        .unwrap_err();

    match error {
        PipelineError::Conflict { conflicts } => {
            assert_eq!(conflicts, vec!["src/cache.rs changed on disk"])
        }
        other => panic!("expected a conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn test_modification_records_expected_content_and_impact() {
    let executor = Harness::new(happy_ai()).executor();
    let mut task = task(TaskType::CodeGeneration, &["src/cache.rs"], TaskConstraints::default());

    run_through(&executor, &mut task, 3).await;

    let implementation = task.last_implementation().unwrap();
    assert_eq!(implementation.explanation, "Memoize lookups");
    assert_eq!(
        implementation.changes[0].expected_before.as_deref(),
        Some(CACHE_SOURCE)
    );

    let modification = &implementation.modifications[0];
    assert_eq!(modification.original_content, CACHE_SOURCE);
    assert!(!modification.changes.is_empty());
    assert_eq!(modification.impact.test_coverage, 0.0);
}

#[tokio::test]
async fn test_index_failure_fails_analysis() {
    let mut harness = Harness::new(happy_ai());
    harness.index = MockRepositoryIndex::failing();
    let executor = harness.executor();
    let mut task = task(TaskType::Analysis, &["src/cache.rs"], TaskConstraints::default());

    let error = executor
        .run_step(&mut task, 0, &PipelineConfiguration::default())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::RepositoryIndex);
}

#[tokio::test]
async fn test_task_index_overrides_shared_index() {
    let executor = Harness::new(happy_ai()).executor();
    let mut task = task(TaskType::Analysis, &["lib/other.rs"], TaskConstraints::default());
    let private: Arc<dyn RepositoryIndex> =
        Arc::new(MockRepositoryIndex::new().with_file("lib/other.rs", "pub fn other() {}\n"));
    task.context.index = Some(private);

    run_through(&executor, &mut task, 1).await;

    let analysis = task.last_analysis().unwrap();
    assert_eq!(analysis.repository.total_files, 1);
    assert_eq!(analysis.files[0].functions, vec!["other"]);
}

#[tokio::test]
async fn test_validation_below_threshold_still_completes() {
    let mut harness = Harness::new(happy_ai());
    harness.validator = MockValidator::new().with_errors("syntax", 2).with_warnings("style", 1);
    let executor = harness.executor();
    let mut task = task(TaskType::CodeGeneration, &["src/cache.rs"], TaskConstraints::default());

    run_through(&executor, &mut task, 4).await;

    let validation = task.last_validation().unwrap();
    assert!(!validation.result.is_valid);
    assert!(!validation.meets_threshold);
    assert_eq!(validation.threshold, 0.8);
    assert_eq!(validation.result.errors.len(), 2);
    assert_eq!(task.steps[3].status, StepStatus::Completed);
    assert!(task.steps[3].validation.is_some());
}

#[tokio::test]
async fn test_testing_reports_failures_without_failing_the_step() {
    let mut harness = Harness::new(happy_ai());
    harness.test_runner = Some(MockTestRunner::failing_files(&["src/cache.rs"]));
    let executor = harness.executor();
    let mut task = task(TaskType::CodeGeneration, &["src/cache.rs"], TaskConstraints::default());

    run_through(&executor, &mut task, 5).await;

    let testing = task.last_testing().unwrap();
    assert_eq!(testing.cases.len(), 1);
    assert_eq!((testing.passed, testing.failed), (0, 1));
    assert_eq!(testing.coverage_estimate, 0.0);
}

#[tokio::test]
async fn test_broken_runner_fails_testing() {
    let mut harness = Harness::new(happy_ai());
    harness.test_runner = Some(MockTestRunner::broken());
    let executor = harness.executor();
    let mut task = task(TaskType::CodeGeneration, &["src/cache.rs"], TaskConstraints::default());

    run_through(&executor, &mut task, 4).await;
    let error = executor
        .run_step(&mut task, 4, &PipelineConfiguration::default())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::TestExecution);
}

#[tokio::test]
async fn test_missing_runner_reports_no_outcomes() {
    let mut harness = Harness::new(happy_ai());
    harness.test_runner = None;
    let executor = harness.executor();
    let mut task = task(TaskType::CodeGeneration, &["src/cache.rs"], TaskConstraints::default());

    run_through(&executor, &mut task, 5).await;

    let testing = task.last_testing().unwrap();
    assert_eq!(testing.cases.len(), 1);
    assert!(testing.outcomes.is_empty());
}

#[tokio::test]
async fn test_documentation_of_analysis_findings() {
    let ai = happy_ai();
    let executor = Harness::new(ai).executor();
    let mut task = task(TaskType::Analysis, &["src/cache.rs"], TaskConstraints::default());

    run_through(&executor, &mut task, 3).await;

    let documentation = task.last_documentation().unwrap();
    assert_eq!(documentation.sections.len(), 2);
    assert_eq!(documentation.sections[1].content, "Call `lookup` with a key.");
}

#[tokio::test]
async fn test_blank_documentation_is_a_parse_error() {
    let ai = ScriptedAi::new().on(PromptKind::Documentation, "   ");
    let executor = Harness::new(ai).executor();
    let mut task = task(TaskType::Analysis, &["src/cache.rs"], TaskConstraints::default());

    run_through(&executor, &mut task, 2).await;
    let error = executor
        .run_step(&mut task, 2, &PipelineConfiguration::default())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Parse);
}
