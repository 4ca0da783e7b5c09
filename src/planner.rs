//! Step planner: task type to a fixed, ordered list of typed steps

use crate::task::{ContextHints, StepInput, StepType, TaskStep, TaskType};

/// Name and description of the step every plan starts with
pub const INITIAL_STEP: (&str, &str) = ("analysis", "Analyze current codebase and requirements");

/// Steps that follow the initial analysis, per task type
fn follow_up_steps(task_type: TaskType) -> &'static [(&'static str, StepType, &'static str)] {
    match task_type {
        TaskType::CodeGeneration => &[
            ("planning", StepType::Planning, "Plan the implementation"),
            ("implementation", StepType::Implementation, "Generate code changes"),
            ("validation", StepType::Validation, "Validate generated code"),
            ("testing", StepType::Testing, "Run tests against the changes"),
        ],
        TaskType::Refactoring => &[
            ("impact-analysis", StepType::Analysis, "Analyze the impact of the refactoring"),
            ("implementation", StepType::Implementation, "Apply the refactoring"),
            ("validation", StepType::Validation, "Validate refactored code"),
            ("testing", StepType::Testing, "Run tests against the refactored code"),
        ],
        TaskType::Analysis => &[
            ("deep-analysis", StepType::Analysis, "Perform deep code analysis"),
            ("documentation", StepType::Documentation, "Document the analysis findings"),
        ],
        TaskType::Testing => &[
            ("test-planning", StepType::Planning, "Plan test coverage"),
            ("test-generation", StepType::Implementation, "Generate test code"),
            ("test-execution", StepType::Testing, "Execute the generated tests"),
        ],
        TaskType::Documentation => &[
            ("content-generation", StepType::Implementation, "Generate documentation content"),
            ("formatting", StepType::Implementation, "Format and finalize documentation"),
        ],
    }
}

/// Build the full step list for a task
///
/// Only the first step carries an input; later steps receive the previous
/// step's output when they start.
pub fn plan(task_type: TaskType, description: &str, context_hints: ContextHints) -> Vec<TaskStep> {
    let (name, step_description) = INITIAL_STEP;
    let first = TaskStep::new(name, StepType::Analysis, step_description).with_input(
        StepInput::Request {
            description: description.to_string(),
            context_hints,
        },
    );

    std::iter::once(first)
        .chain(follow_up_steps(task_type).iter().map(|(name, step_type, description)| {
            TaskStep::new(*name, *step_type, *description)
        }))
        .collect()
}
