//! Step executor
//!
//! Dispatches a step to the handler for its type, times it, and records the
//! outcome on the step. Handler errors stop here: they become `step.error`
//! and are handed back to the caller only so it can decide what the task does
//! next.

mod handlers;
pub mod impact;
pub mod parse;
pub mod prompts;

pub use handlers::HIGH_COMPLEXITY;

use crate::capabilities::{AiCompletion, FileEditApplier, RepositoryIndex, TestRunner, Validator};
use crate::config::PipelineConfiguration;
use crate::error::{PipelineError, PipelineResult};
use crate::task::{StepInput, StepOutput, StepType, Task, TaskStep};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn, Instrument};

/// Everything the handlers talk to
#[derive(Clone)]
pub struct Collaborators {
    pub ai: Arc<dyn AiCompletion>,
    pub index: Arc<dyn RepositoryIndex>,
    pub validator: Arc<dyn Validator>,
    pub applier: Arc<dyn FileEditApplier>,
    /// Without a runner, testing steps report their cases with no outcomes
    pub test_runner: Option<Arc<dyn TestRunner>>,
}

pub struct StepExecutor {
    ai: Arc<dyn AiCompletion>,
    index: Arc<dyn RepositoryIndex>,
    validator: Arc<dyn Validator>,
    applier: Arc<dyn FileEditApplier>,
    test_runner: Option<Arc<dyn TestRunner>>,
}

impl StepExecutor {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            ai: collaborators.ai,
            index: collaborators.index,
            validator: collaborators.validator,
            applier: collaborators.applier,
            test_runner: collaborators.test_runner,
        }
    }

    pub fn ai(&self) -> &Arc<dyn AiCompletion> {
        &self.ai
    }

    pub fn applier(&self) -> &Arc<dyn FileEditApplier> {
        &self.applier
    }

    /// The task's own index when it carries one, the shared index otherwise
    fn index_for(&self, task: &Task) -> Arc<dyn RepositoryIndex> {
        task.context
            .index
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.index))
    }

    /// Run step `index` of `task` and record the outcome on it
    ///
    /// On return the step is either `completed` with its output or `failed`
    /// with the error message. The returned error is informational.
    pub async fn run_step(
        &self,
        task: &mut Task,
        index: usize,
        config: &PipelineConfiguration,
    ) -> PipelineResult<()> {
        if index >= task.steps.len() {
            return Err(PipelineError::internal_error(format!(
                "step index {index} out of range for {} steps",
                task.steps.len()
            )));
        }

        if task.steps[index].input.is_none() {
            if let Some(upstream) = task.upstream_output(index).cloned() {
                task.steps[index].input = Some(StepInput::Upstream {
                    output: Box::new(upstream),
                });
            }
        }
        task.steps[index].start();

        let span = crate::step_span!(
            task_id = %task.id,
            step = %task.steps[index].name,
            step_type = %task.steps[index].step_type,
            index
        );

        let started = Instant::now();
        let outcome = {
            let task_view: &Task = task;
            let step = &task_view.steps[index];
            AssertUnwindSafe(self.dispatch(task_view, step, config).instrument(span))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(PipelineError::internal_error(format!(
                        "step handler panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                })
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let step = &mut task.steps[index];
        match outcome {
            Ok(output) => {
                debug!(step = %step.name, duration_ms, "Step completed");
                step.complete(output, duration_ms);
                Ok(())
            }
            Err(error) => {
                warn!(
                    step = %step.name,
                    duration_ms,
                    error = %error,
                    kind = %error.kind(),
                    "Step failed"
                );
                step.fail(error.to_string(), duration_ms);
                Err(error)
            }
        }
    }

    async fn dispatch(
        &self,
        task: &Task,
        step: &TaskStep,
        config: &PipelineConfiguration,
    ) -> PipelineResult<StepOutput> {
        match step.step_type {
            StepType::Analysis => self.analyze(task).await.map(StepOutput::Analysis),
            StepType::Planning => self.plan(task, step).await.map(StepOutput::Planning),
            StepType::Implementation => self
                .implement(task, step)
                .await
                .map(StepOutput::Implementation),
            StepType::Validation => self.validate(task, config).await.map(StepOutput::Validation),
            StepType::Testing => self.test(task).await.map(StepOutput::Testing),
            StepType::Documentation => self
                .document(task, step)
                .await
                .map(StepOutput::Documentation),
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
