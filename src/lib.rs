//! Agentic Pipeline - autonomous task execution for an AI coding assistant
//!
//! A task is a natural-language request ("add a cache to the lookup path")
//! plus the files it concerns. The pipeline plans it into typed steps
//! (analysis, planning, implementation, validation, testing, documentation),
//! runs the steps in order against pluggable collaborators, corrects failed
//! steps with model-suggested fixes, and reports progress as it goes.
//!
//! # Overview
//!
//! - [`scheduler`]: the public service; queueing, cancellation, timeouts and
//!   configuration updates
//! - [`planner`]: task type to step list
//! - [`executor`]: one handler per step type, prompt building and response
//!   parsing
//! - [`correction`]: the fix-and-retry loop around a failed step
//! - [`validation`]: the five-category validation sub-pipeline
//! - [`capabilities`]: the traits the engine consumes, with filesystem, shell
//!   and LLM-backed adapters
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use agentic_pipeline::capabilities::{
//!     FsEditApplier, HeuristicValidator, ProviderCompletion, WorkspaceIndex,
//! };
//! use agentic_pipeline::llm::{AnthropicConfig, AnthropicProvider};
//! use agentic_pipeline::{Collaborators, TaskPipeline, TaskRequest};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = AnthropicProvider::new(AnthropicConfig {
//!     api_key: std::env::var("ANTHROPIC_API_KEY")?,
//!     ..Default::default()
//! })?;
//! let collaborators = Collaborators {
//!     ai: Arc::new(ProviderCompletion::new(Arc::new(provider), "claude-sonnet-4-20250514")),
//!     index: Arc::new(WorkspaceIndex::scan(".").await?),
//!     validator: Arc::new(HeuristicValidator::new()),
//!     applier: Arc::new(FsEditApplier::new(".")),
//!     test_runner: None,
//! };
//!
//! let pipeline = TaskPipeline::builder(collaborators).build()?;
//! let id = pipeline
//!     .create_task(TaskRequest::new("analysis", "Summarize the cache module"))
//!     .await?;
//! let task = pipeline.wait_for_task(id).await?;
//! println!("{}", task.result.map(|r| r.summary).unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod config;
pub mod correction;
pub mod error;
pub mod executor;
pub mod llm;
pub mod observability;
pub mod planner;
pub mod progress;
pub mod scheduler;
pub mod task;
pub mod testing;
pub mod validation;

pub use config::{ConfigError, ConfigurationUpdate, PipelineConfiguration, PipelineSettings};
pub use error::{PipelineError, PipelineResult, TaskError};
pub use executor::{Collaborators, StepExecutor};
pub use progress::{ProgressEvent, ProgressEventType, ProgressSink};
pub use scheduler::{PipelineBuilder, TaskPipeline, TaskRequest};
pub use task::{Task, TaskId, TaskResult, TaskStatus, TaskType};
