//! Pipeline scheduler and the public engine API
//!
//! Tasks are planned on creation, queued FIFO and drained by a background
//! worker. With `parallel_execution` off exactly one task runs at a time;
//! with it on, up to `max_parallel_tasks`. Either way a running task is owned
//! by its worker and the store only ever sees snapshots the worker publishes.
//!
//! Cancellation and the task deadline are checked at step boundaries only.

mod report;
mod store;

pub use report::build_task_result;
pub use store::TaskStore;

use crate::capabilities::ApplyReport;
use crate::config::{ConfigurationUpdate, PipelineConfiguration};
use crate::correction::run_with_correction;
use crate::error::{PipelineError, PipelineResult, TaskError};
use crate::executor::{panic_message, Collaborators, StepExecutor};
use crate::planner;
use crate::progress::{NoOpProgress, ProgressEvent, ProgressEventType, ProgressSink};
use crate::task::{
    ConstraintOverrides, ContextHints, ContextOverrides, StepType, Task, TaskContext, TaskId,
    TaskProgress, TaskStatus, TaskType,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

/// Everything a caller supplies to create a task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskRequest {
    /// Kebab-case task type, e.g. `code-generation`
    pub task_type: String,
    pub description: String,
    pub context: ContextOverrides,
    pub constraints: ConstraintOverrides,
    pub priority: i32,
}

impl TaskRequest {
    pub fn new(task_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: ContextOverrides) -> Self {
        self.context = context;
        self
    }

    pub fn with_constraints(mut self, constraints: ConstraintOverrides) -> Self {
        self.constraints = constraints;
        self
    }
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<TaskId>,
    /// Tasks claimed by the worker and not yet terminal
    running: usize,
    draining: bool,
    shut_down: bool,
}

struct Inner {
    store: RwLock<TaskStore>,
    queue: Mutex<QueueState>,
    config: RwLock<PipelineConfiguration>,
    executor: StepExecutor,
    progress: Arc<dyn ProgressSink>,
    tokens: Mutex<HashMap<TaskId, CancellationToken>>,
    /// Bumped on every published state change
    version: watch::Sender<u64>,
    workspace_root: PathBuf,
}

/// The task engine; cheap to clone, all clones share one scheduler
#[derive(Clone)]
pub struct TaskPipeline {
    inner: Arc<Inner>,
}

/// Builds a `TaskPipeline`; configuration defaults and a no-op progress sink
pub struct PipelineBuilder {
    collaborators: Collaborators,
    config: PipelineConfiguration,
    progress: Arc<dyn ProgressSink>,
    workspace_root: PathBuf,
}

impl PipelineBuilder {
    pub fn config(mut self, config: PipelineConfiguration) -> Self {
        self.config = config;
        self
    }

    pub fn progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Default workspace root for tasks that do not name one
    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn build(self) -> PipelineResult<TaskPipeline> {
        self.config.validate()?;
        let (version, _) = watch::channel(0);

        Ok(TaskPipeline {
            inner: Arc::new(Inner {
                store: RwLock::new(TaskStore::new()),
                queue: Mutex::new(QueueState::default()),
                config: RwLock::new(self.config),
                executor: StepExecutor::new(self.collaborators),
                progress: self.progress,
                tokens: Mutex::new(HashMap::new()),
                version,
                workspace_root: self.workspace_root,
            }),
        })
    }
}

impl TaskPipeline {
    pub fn builder(collaborators: Collaborators) -> PipelineBuilder {
        PipelineBuilder {
            collaborators,
            config: PipelineConfiguration::default(),
            progress: Arc::new(NoOpProgress),
            workspace_root: PathBuf::from("."),
        }
    }

    pub fn new(
        config: PipelineConfiguration,
        collaborators: Collaborators,
    ) -> PipelineResult<Self> {
        Self::builder(collaborators).config(config).build()
    }

    /// Validate, plan and enqueue a task
    pub async fn create_task(&self, request: TaskRequest) -> PipelineResult<TaskId> {
        let task_type: TaskType = request.task_type.parse()?;
        let description = request.description.trim().to_string();
        if description.is_empty() {
            return Err(PipelineError::invalid_input("task description is empty"));
        }
        let constraints = request.constraints.resolve()?;

        let overrides = request.context;
        let context = TaskContext {
            workspace_root: overrides
                .workspace_root
                .unwrap_or_else(|| self.inner.workspace_root.clone()),
            target_files: overrides.target_files,
            selected_text: overrides.selected_text,
            user_instructions: overrides.user_instructions,
            project: overrides.project.unwrap_or_default(),
            constraints,
            index: None,
        };

        let hints = ContextHints {
            target_files: context.target_files.clone(),
            selected_text: context.selected_text.clone(),
            user_instructions: context.user_instructions.clone(),
        };
        let steps = planner::plan(task_type, &description, hints);
        let task = Task::new(task_type, description, request.priority, context, steps);
        let id = task.id;

        {
            let mut queue = self.inner.queue.lock().await;
            if queue.shut_down {
                return Err(PipelineError::invalid_input("pipeline is shut down"));
            }
            self.inner.store.write().await.insert(task);
            self.inner
                .tokens
                .lock()
                .await
                .insert(id, CancellationToken::new());
            queue.pending.push_back(id);
        }

        info!(task_id = %id, task_type = %task_type, "Task created");
        self.notify();
        self.start_draining().await;
        Ok(id)
    }

    pub async fn get_task(&self, id: TaskId) -> Option<Task> {
        self.inner.store.read().await.get(&id).cloned()
    }

    /// Every task in the table, terminal ones included, in creation order
    pub async fn get_active_tasks(&self) -> Vec<Task> {
        self.inner.store.read().await.all()
    }

    pub async fn get_task_progress(&self, id: TaskId) -> Option<TaskProgress> {
        self.inner.store.read().await.get(&id).map(Task::progress)
    }

    /// Cancel a task
    ///
    /// A pending task is cancelled and removed at once (`true`). A running
    /// task is asked to stop at its next step boundary (`false`). Terminal or
    /// unknown tasks are left alone (`false`).
    pub async fn cancel_task(&self, id: TaskId) -> bool {
        let mut store = self.inner.store.write().await;
        let status = match store.get(&id) {
            Some(task) => task.status,
            None => return false,
        };

        match status {
            TaskStatus::Pending => {
                let Some(mut task) = store.remove(&id) else {
                    return false;
                };
                drop(store);
                task.mark_cancelled();

                self.inner.queue.lock().await.pending.retain(|queued| *queued != id);
                self.inner.tokens.lock().await.remove(&id);
                self.inner.progress.report(ProgressEvent::new(
                    id,
                    ProgressEventType::TaskCancelled,
                    0,
                    task.steps.len(),
                    "Cancelled before start",
                ));
                info!(task_id = %id, "Pending task cancelled");
                self.notify();
                true
            }
            TaskStatus::InProgress => {
                drop(store);
                if let Some(token) = self.inner.tokens.lock().await.get(&id) {
                    token.cancel();
                }
                info!(task_id = %id, "Cancellation requested for running task");
                false
            }
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => false,
        }
    }

    pub async fn get_configuration(&self) -> PipelineConfiguration {
        self.inner.config.read().await.clone()
    }

    /// Apply a partial update; a rejected update changes nothing
    pub async fn update_configuration(
        &self,
        update: ConfigurationUpdate,
    ) -> PipelineResult<PipelineConfiguration> {
        let mut config = self.inner.config.write().await;
        config.apply(&update)?;
        info!(?update, "Configuration updated");
        Ok(config.clone())
    }

    /// Resolve once the task is terminal
    pub async fn wait_for_task(&self, id: TaskId) -> PipelineResult<Task> {
        let mut changes = self.inner.version.subscribe();
        loop {
            match self.get_task(id).await {
                Some(task) if task.status.is_terminal() => return Ok(task),
                Some(_) => {}
                None => {
                    return Err(PipelineError::TaskNotFound {
                        task_id: id.to_string(),
                    })
                }
            }
            if changes.changed().await.is_err() {
                return Err(PipelineError::internal_error("scheduler stopped"));
            }
        }
    }

    /// Write a completed task's changes through the applier
    pub async fn apply_task_changes(&self, id: TaskId) -> PipelineResult<ApplyReport> {
        let task = self.get_task(id).await.ok_or_else(|| PipelineError::TaskNotFound {
            task_id: id.to_string(),
        })?;
        if task.status != TaskStatus::Completed {
            return Err(PipelineError::invalid_input(format!(
                "{id} is {:?}, only completed tasks can be applied",
                task.status
            )));
        }

        let Some(implementation) = task.last_implementation() else {
            return Ok(ApplyReport {
                success: true,
                ..Default::default()
            });
        };

        let report = self
            .inner
            .executor
            .applier()
            .apply(&implementation.changes, false)
            .await?;
        info!(
            task_id = %id,
            applied = report.applied.len(),
            conflicts = report.conflicts.len(),
            "Applied task changes"
        );
        Ok(report)
    }

    /// Stop picking up queued tasks and wait for the ones in flight
    pub async fn shutdown(&self) {
        let mut changes = self.inner.version.subscribe();
        self.inner.queue.lock().await.shut_down = true;
        info!("Scheduler shutting down");
        self.notify();

        loop {
            if !self.inner.queue.lock().await.draining {
                break;
            }
            if changes.changed().await.is_err() {
                break;
            }
        }
    }

    fn notify(&self) {
        self.inner.version.send_modify(|version| *version = version.wrapping_add(1));
    }

    async fn start_draining(&self) {
        {
            let mut queue = self.inner.queue.lock().await;
            if queue.draining || queue.shut_down {
                return;
            }
            queue.draining = true;
        }

        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.drain().await });
    }

    /// Pop and run queued tasks until the queue is empty and nothing runs
    ///
    /// The concurrency limit is re-read before every pickup, so with a limit
    /// of one the next task is not even claimed until the previous one is
    /// finished. Between pickups the worker sleeps on the state version.
    async fn drain(self) {
        let mut changes = self.inner.version.subscribe();
        loop {
            changes.borrow_and_update();
            let config = self.get_configuration().await;
            let limit = if config.parallel_execution {
                config.max_parallel_tasks.max(1)
            } else {
                1
            };

            let next = {
                let mut queue = self.inner.queue.lock().await;
                let idle = queue.shut_down || queue.pending.is_empty();
                if idle && queue.running == 0 {
                    queue.draining = false;
                    drop(queue);
                    self.notify();
                    debug!("Task queue drained");
                    return;
                }
                if idle || queue.running >= limit {
                    None
                } else {
                    queue.running += 1;
                    queue.pending.pop_front()
                }
            };

            let Some(id) = next else {
                if changes.changed().await.is_err() {
                    return;
                }
                continue;
            };

            let Some(task) = self.inner.store.write().await.claim(&id) else {
                debug!(task_id = %id, "Skipping task that is no longer pending");
                self.inner.queue.lock().await.running -= 1;
                continue;
            };
            debug!(task_id = %id, limit, "Task picked up");
            self.notify();

            let pipeline = self.clone();
            tokio::spawn(async move {
                let worker = pipeline.clone();
                let job = tokio::spawn(async move { worker.run_task(task).await });
                if let Err(join_error) = job.await {
                    pipeline.abandon_task(id, join_error).await;
                }
                pipeline.inner.queue.lock().await.running -= 1;
                pipeline.notify();
            });
        }
    }

    /// Fail a task whose worker died before publishing a terminal state
    async fn abandon_task(&self, id: TaskId, join_error: JoinError) {
        let message = if join_error.is_panic() {
            format!(
                "task worker panicked: {}",
                panic_message(join_error.into_panic().as_ref())
            )
        } else {
            format!("task worker stopped: {join_error}")
        };
        self.inner.tokens.lock().await.remove(&id);

        let Some(mut task) = self.get_task(id).await else {
            return;
        };
        if task.status.is_terminal() {
            return;
        }
        let failure = PipelineError::internal_error(message);
        error!(task_id = %id, error = %failure, "Task worker died");
        task.mark_failed(TaskError::from(&failure));
        self.publish(&task).await;
    }

    async fn publish(&self, task: &Task) {
        self.inner.store.write().await.update(task.clone());
        self.notify();
    }

    fn report(&self, task: &Task, event_type: ProgressEventType, message: impl Into<String>) {
        self.inner.progress.report(ProgressEvent::new(
            task.id,
            event_type,
            task.current_step,
            task.steps.len(),
            message,
        ));
    }

    /// Run a claimed task to a terminal state
    async fn run_task(&self, mut task: Task) {
        let span = crate::task_span!(task_id = %task.id, task_type = %task.task_type);
        async {
            let token = self
                .inner
                .tokens
                .lock()
                .await
                .get(&task.id)
                .cloned()
                .unwrap_or_default();

            info!(steps = task.steps.len(), "Task started");
            self.report(&task, ProgressEventType::TaskStart, task.description.clone());

            self.run_steps(&mut task, &token).await;

            self.inner.tokens.lock().await.remove(&task.id);
            self.publish(&task).await;
        }
        .instrument(span)
        .await
    }

    async fn run_steps(&self, task: &mut Task, token: &CancellationToken) {
        let started = Instant::now();

        for index in 0..task.steps.len() {
            task.current_step = index;
            let config = self.get_configuration().await;

            if token.is_cancelled() {
                task.mark_cancelled();
                info!(at_step = index, "Task cancelled");
                self.report(task, ProgressEventType::TaskCancelled, "Cancelled");
                return;
            }

            let elapsed_ms = started.elapsed().as_millis() as u64;
            if elapsed_ms >= config.timeout_ms {
                let timeout = PipelineError::Timeout {
                    elapsed_ms,
                    limit_ms: config.timeout_ms,
                };
                error!(at_step = index, error = %timeout, "Task timed out");
                task.mark_failed(TaskError::from(&timeout));
                self.report(task, ProgressEventType::TaskFailed, timeout.to_string());
                return;
            }

            let step_type = task.steps[index].step_type;
            let disabled = match step_type {
                StepType::Validation => !config.enable_validation,
                StepType::Testing => !config.enable_testing,
                _ => false,
            };
            if disabled {
                task.steps[index].skip();
                debug!(step = %task.steps[index].name, "Step skipped by configuration");
                let message = format!("Skipped: {}", task.steps[index].description);
                self.report(task, ProgressEventType::StepSkipped, message);
                self.publish(task).await;
                continue;
            }

            let description = task.steps[index].description.clone();
            self.report(task, ProgressEventType::StepStart, description.clone());
            self.publish(task).await;

            let outcome = run_with_correction(
                &self.inner.executor,
                task,
                index,
                &config,
                self.inner.progress.as_ref(),
            )
            .await;

            match outcome {
                Ok(()) => {
                    self.report(task, ProgressEventType::StepComplete, description);
                    self.publish(task).await;
                }
                Err(step_error) => {
                    self.report(task, ProgressEventType::StepFailed, step_error.to_string());
                    error!(
                        step = %task.steps[index].name,
                        kind = %step_error.kind(),
                        error = %step_error,
                        "Task failed"
                    );
                    task.mark_failed(TaskError::from(&step_error));
                    self.report(task, ProgressEventType::TaskFailed, step_error.to_string());
                    return;
                }
            }
        }

        let execution_time_ms = started.elapsed().as_millis() as u64;
        let result = build_task_result(task, execution_time_ms);
        info!(
            execution_time_ms,
            files_affected = result.metrics.files_affected,
            "Task completed"
        );
        task.mark_completed(result);
        self.report(task, ProgressEventType::TaskComplete, "Completed");
    }
}
