//! Task model: tasks, steps, typed step payloads and results

pub mod model;
pub mod output;
pub mod result;
pub mod validation;

pub use model::{
    ConstraintOverrides, ContextOverrides, ProjectContext, StepStatus, StepType, Task,
    TaskConstraints, TaskContext, TaskId, TaskProgress, TaskStatus, TaskStep, TaskType,
};
pub use output::{
    AnalysisOutput, ContextHints, CorrectionFix, DocSection, DocumentationOutput,
    EstimatedComplexity, ImplementationOutput, PlanningOutput, StepInput, StepOutput,
    TestingOutput, ValidationOutput,
};
pub use result::{
    diff_lines, lines_changed, BreakingChange, BreakingChangeType, Change, ChangeType,
    FileChange, FileChangeKind, FileCreation, FileDeletion, FileModification, ImpactAnalysis,
    PerformanceImpact, SecurityImpact, Severity, TaskMetrics, TaskResult,
};
pub use validation::{
    confidence_for, FindingSeverity, ValidationError, ValidationErrorKind, ValidationResult,
    ValidationWarning, ValidationWarningKind,
};
