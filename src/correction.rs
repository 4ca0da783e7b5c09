//! Error-correction loop
//!
//! When a step fails and correction is enabled, the model is asked for fixes,
//! the fixes are folded into the step's input, and the same step (same id)
//! is re-run through the executor. At most `max_retries` rounds per step.

use crate::config::PipelineConfiguration;
use crate::error::{PipelineError, PipelineResult};
use crate::executor::{parse, prompts, StepExecutor};
use crate::progress::{ProgressEvent, ProgressEventType, ProgressSink};
use crate::task::{CorrectionFix, StepInput, Task};
use tracing::{info, warn};

/// Run step `index`, correcting and retrying it while the configuration allows
///
/// Returns the original error when correction is off, and
/// `PipelineError::CorrectionFailed` when every round failed. In both cases
/// the step is left `failed` with the final message in `step.error`.
pub async fn run_with_correction(
    executor: &StepExecutor,
    task: &mut Task,
    index: usize,
    config: &PipelineConfiguration,
    progress: &dyn ProgressSink,
) -> PipelineResult<()> {
    let mut last_error = match executor.run_step(task, index, config).await {
        Ok(()) => return Ok(()),
        Err(error) => error,
    };

    if !config.correction_enabled() {
        return Err(last_error);
    }

    let total = task.steps.len();
    for round in 1..=config.max_retries {
        progress.report(ProgressEvent::new(
            task.id,
            ProgressEventType::CorrectionAttempt,
            index,
            total,
            format!(
                "Correction {round}/{} for {}",
                config.max_retries, task.steps[index].description
            ),
        ));
        info!(
            task_id = %task.id,
            step = %task.steps[index].name,
            round,
            max_rounds = config.max_retries,
            "Attempting error correction"
        );

        let failure = task.steps[index]
            .error
            .clone()
            .unwrap_or_else(|| last_error.to_string());

        let fixes = match request_fixes(executor, task, index, &failure).await {
            Ok(fixes) => fixes,
            Err(error) => {
                warn!(task_id = %task.id, round, error = %error, "Correction request failed");
                last_error = error;
                task.steps[index].correction_attempts += 1;
                continue;
            }
        };

        let step = &mut task.steps[index];
        step.input = Some(StepInput::Corrected {
            previous: step.input.take().map(Box::new),
            error: failure,
            fixes,
        });
        step.correction_attempts += 1;

        match executor.run_step(task, index, config).await {
            Ok(()) => {
                info!(task_id = %task.id, round, "Step succeeded after correction");
                return Ok(());
            }
            Err(error) => last_error = error,
        }
    }

    let error = PipelineError::CorrectionFailed {
        message: last_error.to_string(),
    };
    task.steps[index].error = Some(error.to_string());
    warn!(task_id = %task.id, step = %task.steps[index].name, error = %error, "Giving up on step");
    Err(error)
}

async fn request_fixes(
    executor: &StepExecutor,
    task: &Task,
    index: usize,
    failure: &str,
) -> PipelineResult<Vec<CorrectionFix>> {
    let prompt = prompts::correction(task, &task.steps[index], failure);
    let response = executor.ai().complete(&prompt).await?;
    parse::parse_fixes(&response)
}
