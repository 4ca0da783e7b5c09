//! Agentic Pipeline - command line entry point
//!
//! Runs a single task against a local workspace and prints the finished task
//! as JSON.

use agentic_pipeline::capabilities::{
    CommandTestRunner, FsEditApplier, HeuristicValidator, ProviderCompletion, TestRunner,
    WorkspaceIndex,
};
use agentic_pipeline::config::PipelineSettings;
use agentic_pipeline::llm::{AnthropicConfig, AnthropicProvider};
use agentic_pipeline::observability::init_default_logging;
use agentic_pipeline::progress::LoggingProgress;
use agentic_pipeline::task::ContextOverrides;
use agentic_pipeline::{Collaborators, TaskPipeline, TaskRequest, TaskStatus};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Autonomous task execution for code changes
#[derive(Parser)]
#[command(name = "agentic-pipeline")]
#[command(about = "Plan, implement, validate, test and document code changes")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one task to completion
    Run {
        /// Task type: code-generation, refactoring, analysis, testing or documentation
        #[arg(long = "type", value_name = "TYPE")]
        task_type: String,

        /// What the task should achieve
        #[arg(long)]
        description: String,

        /// Target file, relative to the workspace root (repeatable)
        #[arg(long = "file", value_name = "PATH")]
        files: Vec<String>,

        /// Extra instructions passed to every prompt
        #[arg(long)]
        instructions: Option<String>,

        /// Write the generated changes to the workspace when the task completes
        #[arg(long)]
        apply: bool,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting agentic-pipeline v{}", env!("CARGO_PKG_VERSION"));

    let settings = match load_configuration(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run {
            task_type,
            description,
            files,
            instructions,
            apply,
        } => {
            let request = TaskRequest::new(task_type, description).with_context(ContextOverrides {
                target_files: files,
                user_instructions: instructions,
                ..Default::default()
            });
            run_task(settings, request, apply).await
        }
        Commands::Config { show } => handle_config_command(&settings, show),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(e) => {
            error!("Command failed: {}", e);
            process::exit(1);
        }
    }
}

fn load_configuration(
    config_path: Option<&Path>,
) -> Result<PipelineSettings, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(PipelineSettings::load_from_file(path)?);
    }

    for candidate in ["pipeline.toml", "config/pipeline.toml"] {
        let path = PathBuf::from(candidate);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(PipelineSettings::load_from_file(&path)?);
        }
    }

    info!("No configuration file found, using defaults");
    let settings = PipelineSettings::default();
    settings.validate()?;
    Ok(settings)
}

/// Wire the concrete adapters from the settings file
async fn build_collaborators(
    settings: &PipelineSettings,
) -> Result<Collaborators, Box<dyn std::error::Error>> {
    let mut anthropic = AnthropicConfig {
        api_key: settings.get_llm_api_key()?,
        ..Default::default()
    };
    if let Some(base_url) = &settings.llm.base_url {
        anthropic.base_url = base_url.clone();
    }
    let provider = Arc::new(AnthropicProvider::new(anthropic)?);

    let root = &settings.workspace.root;
    let index = WorkspaceIndex::scan(root.clone()).await?;
    info!(root = %root.display(), files = index.file_count(), "Workspace indexed");

    let test_runner: Option<Arc<dyn TestRunner>> =
        settings.workspace.test_command.as_ref().map(|command| {
            Arc::new(CommandTestRunner::new(command.clone(), root.clone())) as Arc<dyn TestRunner>
        });

    Ok(Collaborators {
        ai: Arc::new(ProviderCompletion::from_settings(provider, &settings.llm)),
        index: Arc::new(index),
        validator: Arc::new(HeuristicValidator::new()),
        applier: Arc::new(FsEditApplier::new(root.clone())),
        test_runner,
    })
}

/// Returns whether the task completed
async fn run_task(
    settings: PipelineSettings,
    request: TaskRequest,
    apply: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let collaborators = build_collaborators(&settings).await?;
    let pipeline = TaskPipeline::builder(collaborators)
        .config(settings.pipeline.clone())
        .progress(Arc::new(LoggingProgress))
        .workspace_root(settings.workspace.root.clone())
        .build()?;

    let id = pipeline.create_task(request).await?;
    info!(task_id = %id, "Task queued");

    let task = tokio::select! {
        task = pipeline.wait_for_task(id) => task?,
        _ = signal::ctrl_c() => {
            info!("Received Ctrl-C, cancelling task...");
            if pipeline.cancel_task(id).await {
                info!(task_id = %id, "Task cancelled before it started");
                pipeline.shutdown().await;
                return Ok(false);
            }
            pipeline.wait_for_task(id).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&task)?);

    let completed = task.status == TaskStatus::Completed;
    if completed && apply {
        let report = pipeline.apply_task_changes(id).await?;
        for conflict in &report.conflicts {
            warn!(conflict = %conflict, "Change not applied");
        }
        info!(applied = report.applied.len(), success = report.success, "Changes applied");
        if !report.success {
            pipeline.shutdown().await;
            return Ok(false);
        }
    }

    pipeline.shutdown().await;
    Ok(completed)
}

fn handle_config_command(
    settings: &PipelineSettings,
    show: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(settings)?);
    }

    info!("Configuration validation complete");
    Ok(true)
}
