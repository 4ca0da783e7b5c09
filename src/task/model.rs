//! Task and step entities
//!
//! A `Task` owns its context, its full step list (built once at planning time)
//! and a cursor into that list. Steps are mutated in place by the executor and
//! the correction loop; the list never grows after planning.

use super::output::{
    AnalysisOutput, DocumentationOutput, ImplementationOutput, PlanningOutput, StepInput,
    StepOutput, TestingOutput, ValidationOutput,
};
use super::result::TaskResult;
use super::validation::ValidationResult;
use crate::error::{PipelineError, TaskError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque, unique task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Kind of work a task performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    CodeGeneration,
    Refactoring,
    Analysis,
    Testing,
    Documentation,
}

impl TaskType {
    pub const ALL: [TaskType; 5] = [
        TaskType::CodeGeneration,
        TaskType::Refactoring,
        TaskType::Analysis,
        TaskType::Testing,
        TaskType::Documentation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::CodeGeneration => "code-generation",
            TaskType::Refactoring => "refactoring",
            TaskType::Analysis => "analysis",
            TaskType::Testing => "testing",
            TaskType::Documentation => "documentation",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| PipelineError::unsupported_task_type(s))
    }
}

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Completed, failed and cancelled tasks never re-enter the queue
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Pipeline stage kind; dispatch in the executor is an exhaustive match on this
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepType {
    Analysis,
    Planning,
    Implementation,
    Validation,
    Testing,
    Documentation,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Analysis => "analysis",
            StepType::Planning => "planning",
            StepType::Implementation => "implementation",
            StepType::Validation => "validation",
            StepType::Testing => "testing",
            StepType::Documentation => "documentation",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Completed or skipped steps may sit behind the task cursor
    pub fn is_done(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Skipped)
    }
}

/// Limits a task must respect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConstraints {
    pub max_files: usize,
    pub preserve_existing_tests: bool,
    pub require_validation: bool,
    pub allow_external_dependencies: bool,
}

impl Default for TaskConstraints {
    fn default() -> Self {
        Self {
            max_files: 10,
            preserve_existing_tests: true,
            require_validation: true,
            allow_external_dependencies: false,
        }
    }
}

/// Caller-supplied subset of `TaskConstraints`; unset fields keep their defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintOverrides {
    pub max_files: Option<usize>,
    pub preserve_existing_tests: Option<bool>,
    pub require_validation: Option<bool>,
    pub allow_external_dependencies: Option<bool>,
}

impl ConstraintOverrides {
    /// Merge onto the defaults, rejecting values no plan could satisfy
    pub fn resolve(&self) -> Result<TaskConstraints, PipelineError> {
        let defaults = TaskConstraints::default();
        let constraints = TaskConstraints {
            max_files: self.max_files.unwrap_or(defaults.max_files),
            preserve_existing_tests: self
                .preserve_existing_tests
                .unwrap_or(defaults.preserve_existing_tests),
            require_validation: self
                .require_validation
                .unwrap_or(defaults.require_validation),
            allow_external_dependencies: self
                .allow_external_dependencies
                .unwrap_or(defaults.allow_external_dependencies),
        };

        if constraints.max_files == 0 {
            return Err(PipelineError::invalid_constraints(
                "max_files must be at least 1",
            ));
        }

        Ok(constraints)
    }
}

/// Snapshot of what the project looks like from the outside
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub framework: Option<String>,
    /// Dependency name to version requirement
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

/// Immutable inputs of a task
#[derive(Clone, Serialize, Deserialize)]
pub struct TaskContext {
    pub workspace_root: PathBuf,
    pub target_files: Vec<String>,
    pub selected_text: Option<String>,
    pub user_instructions: Option<String>,
    pub project: ProjectContext,
    pub constraints: TaskConstraints,
    /// Handle to the repository index this task was planned against
    #[serde(skip)]
    pub index: Option<Arc<dyn crate::capabilities::RepositoryIndex>>,
}

impl Default for TaskContext {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            target_files: Vec::new(),
            selected_text: None,
            user_instructions: None,
            project: ProjectContext::default(),
            constraints: TaskConstraints::default(),
            index: None,
        }
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("workspace_root", &self.workspace_root)
            .field("target_files", &self.target_files)
            .field("selected_text", &self.selected_text)
            .field("user_instructions", &self.user_instructions)
            .field("project", &self.project)
            .field("constraints", &self.constraints)
            .field("index", &self.index.as_ref().map(|_| "<repository index>"))
            .finish()
    }
}

/// Caller-supplied subset of `TaskContext`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOverrides {
    pub workspace_root: Option<PathBuf>,
    pub target_files: Vec<String>,
    pub selected_text: Option<String>,
    pub user_instructions: Option<String>,
    pub project: Option<ProjectContext>,
}

/// One typed stage of a task's pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    pub id: Uuid,
    /// Plan-level name, e.g. `impact-analysis`
    pub name: String,
    pub step_type: StepType,
    pub description: String,
    pub status: StepStatus,
    pub input: Option<StepInput>,
    pub output: Option<StepOutput>,
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Number of correction rounds spent on this step
    pub correction_attempts: u32,
    pub validation: Option<ValidationResult>,
}

impl TaskStep {
    pub fn new(
        name: impl Into<String>,
        step_type: StepType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            step_type,
            description: description.into(),
            status: StepStatus::Pending,
            input: None,
            output: None,
            error: None,
            duration_ms: 0,
            correction_attempts: 0,
            validation: None,
        }
    }

    pub fn with_input(mut self, input: StepInput) -> Self {
        self.input = Some(input);
        self
    }

    /// Mark as running; a failed step may be re-entered by the correction loop
    pub fn start(&mut self) {
        self.status = StepStatus::InProgress;
        self.error = None;
    }

    pub fn complete(&mut self, output: StepOutput, duration_ms: u64) {
        if let StepOutput::Validation(ValidationOutput { result, .. }) = &output {
            self.validation = Some(result.clone());
        }
        self.status = StepStatus::Completed;
        self.output = Some(output);
        self.error = None;
        self.duration_ms = duration_ms;
    }

    pub fn fail(&mut self, error: impl Into<String>, duration_ms: u64) {
        self.status = StepStatus::Failed;
        self.error = Some(error.into());
        self.duration_ms = duration_ms;
    }

    pub fn skip(&mut self) {
        self.status = StepStatus::Skipped;
    }
}

/// Unit of agentic work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type: TaskType,
    pub description: String,
    /// Stored for callers; the scheduler is FIFO and never reads it
    pub priority: i32,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub context: TaskContext,
    pub steps: Vec<TaskStep>,
    pub current_step: usize,
    pub result: Option<TaskResult>,
    pub error: Option<TaskError>,
}

impl Task {
    pub fn new(
        task_type: TaskType,
        description: impl Into<String>,
        priority: i32,
        context: TaskContext,
        steps: Vec<TaskStep>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            task_type,
            description: description.into(),
            priority,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            context,
            steps,
            current_step: 0,
            result: None,
            error: None,
        }
    }

    pub fn mark_started(&mut self) {
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, result: TaskResult) {
        self.status = TaskStatus::Completed;
        self.current_step = self.steps.len();
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: TaskError) {
        self.status = TaskStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Step under the cursor, if any
    pub fn active_step(&self) -> Option<&TaskStep> {
        self.steps.get(self.current_step)
    }

    /// Output of the most recent completed step of `step_type`
    ///
    /// Lookup is by type, not by position: later steps ask what the last
    /// completed planning step produced.
    pub fn last_output(&self, step_type: StepType) -> Option<&StepOutput> {
        self.steps
            .iter()
            .rev()
            .filter(|step| step.step_type == step_type && step.status == StepStatus::Completed)
            .find_map(|step| step.output.as_ref())
    }

    pub fn last_analysis(&self) -> Option<&AnalysisOutput> {
        match self.last_output(StepType::Analysis) {
            Some(StepOutput::Analysis(output)) => Some(output),
            _ => None,
        }
    }

    pub fn last_plan(&self) -> Option<&PlanningOutput> {
        match self.last_output(StepType::Planning) {
            Some(StepOutput::Planning(output)) => Some(output),
            _ => None,
        }
    }

    pub fn last_implementation(&self) -> Option<&ImplementationOutput> {
        match self.last_output(StepType::Implementation) {
            Some(StepOutput::Implementation(output)) => Some(output),
            _ => None,
        }
    }

    pub fn last_validation(&self) -> Option<&ValidationOutput> {
        match self.last_output(StepType::Validation) {
            Some(StepOutput::Validation(output)) => Some(output),
            _ => None,
        }
    }

    pub fn last_testing(&self) -> Option<&TestingOutput> {
        match self.last_output(StepType::Testing) {
            Some(StepOutput::Testing(output)) => Some(output),
            _ => None,
        }
    }

    pub fn last_documentation(&self) -> Option<&DocumentationOutput> {
        match self.last_output(StepType::Documentation) {
            Some(StepOutput::Documentation(output)) => Some(output),
            _ => None,
        }
    }

    /// Output of the closest finished step before `index`, used as the next input
    pub fn upstream_output(&self, index: usize) -> Option<&StepOutput> {
        self.steps[..index.min(self.steps.len())]
            .iter()
            .rev()
            .filter(|step| step.status == StepStatus::Completed)
            .find_map(|step| step.output.as_ref())
    }

    /// Coarse progress view for status queries
    pub fn progress(&self) -> TaskProgress {
        let current_step_description = self
            .active_step()
            .map(|step| step.description.clone())
            .unwrap_or_else(|| match self.status {
                TaskStatus::Completed => "Completed".to_string(),
                TaskStatus::Failed => "Failed".to_string(),
                TaskStatus::Cancelled => "Cancelled".to_string(),
                TaskStatus::Pending | TaskStatus::InProgress => String::new(),
            });

        TaskProgress {
            task_id: self.id,
            status: self.status,
            current: self.current_step,
            total: self.steps.len(),
            current_step_description,
        }
    }
}

/// Progress of a task through its steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub current: usize,
    pub total: usize,
    pub current_step_description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::output::{AnalysisOutput, PlanningOutput};

    fn context() -> TaskContext {
        TaskContext {
            workspace_root: PathBuf::from("."),
            target_files: vec!["src/lib.rs".to_string()],
            selected_text: None,
            user_instructions: None,
            project: ProjectContext::default(),
            constraints: TaskConstraints::default(),
            index: None,
        }
    }

    fn plan_output(summary: &str) -> StepOutput {
        StepOutput::Planning(PlanningOutput {
            summary: summary.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_task_type_parses_known_names() {
        assert_eq!("code-generation".parse::<TaskType>().unwrap(), TaskType::CodeGeneration);
        assert_eq!("refactoring".parse::<TaskType>().unwrap(), TaskType::Refactoring);
        assert_eq!("Documentation".parse::<TaskType>().unwrap(), TaskType::Documentation);
        assert_eq!("code_generation".parse::<TaskType>().unwrap(), TaskType::CodeGeneration);
    }

    #[test]
    fn test_task_type_rejects_unknown_names() {
        let err = "deployment".parse::<TaskType>().unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedTaskType { .. }));
    }

    #[test]
    fn test_constraint_overrides_merge_onto_defaults() {
        let overrides = ConstraintOverrides {
            max_files: Some(3),
            allow_external_dependencies: Some(true),
            ..Default::default()
        };
        let constraints = overrides.resolve().unwrap();

        assert_eq!(constraints.max_files, 3);
        assert!(constraints.allow_external_dependencies);
        assert!(constraints.preserve_existing_tests);
        assert!(constraints.require_validation);
    }

    #[test]
    fn test_zero_max_files_is_rejected() {
        let overrides = ConstraintOverrides {
            max_files: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            overrides.resolve(),
            Err(PipelineError::InvalidConstraints { .. })
        ));
    }

    #[test]
    fn test_last_output_returns_most_recent_completed_of_type() {
        let mut first = TaskStep::new("planning", StepType::Planning, "first plan");
        first.complete(plan_output("first"), 1);
        let mut second = TaskStep::new("planning", StepType::Planning, "second plan");
        second.complete(plan_output("second"), 1);
        let mut failed = TaskStep::new("planning", StepType::Planning, "failed plan");
        failed.output = Some(plan_output("stale"));
        failed.fail("boom", 1);

        let task = Task::new(
            TaskType::CodeGeneration,
            "demo",
            0,
            context(),
            vec![first, second, failed],
        );

        assert_eq!(task.last_plan().unwrap().summary, "second");
        assert!(task.last_analysis().is_none());
    }

    #[test]
    fn test_upstream_output_skips_unfinished_steps() {
        let mut analysis = TaskStep::new("analysis", StepType::Analysis, "analyze");
        analysis.complete(StepOutput::Analysis(AnalysisOutput::default()), 3);
        let mut skipped = TaskStep::new("validation", StepType::Validation, "validate");
        skipped.skip();
        let pending = TaskStep::new("testing", StepType::Testing, "test");

        let task = Task::new(
            TaskType::CodeGeneration,
            "demo",
            0,
            context(),
            vec![analysis, skipped, pending],
        );

        assert!(matches!(
            task.upstream_output(2),
            Some(StepOutput::Analysis(_))
        ));
        assert!(task.upstream_output(0).is_none());
    }

    #[test]
    fn test_mark_completed_moves_cursor_past_last_step() {
        let steps = vec![
            TaskStep::new("analysis", StepType::Analysis, "a"),
            TaskStep::new("documentation", StepType::Documentation, "b"),
        ];
        let mut task = Task::new(TaskType::Analysis, "demo", 0, context(), steps);
        task.mark_started();
        task.mark_completed(TaskResult::default());

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.current_step, task.steps.len());
        assert!(task.completed_at.unwrap() >= task.started_at.unwrap());
        assert_eq!(task.progress().current_step_description, "Completed");
    }

    #[test]
    fn test_task_id_display_has_prefix() {
        assert!(TaskId::new().to_string().starts_with("task-"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }
}
