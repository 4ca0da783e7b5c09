//! Pipeline configuration
//!
//! `PipelineConfiguration` is the process-wide engine configuration; it can be
//! replaced piecewise at runtime through a validated `ConfigurationUpdate`.
//! `PipelineSettings` is the TOML file read by the CLI, which also names the
//! LLM backend and the workspace to operate on.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Engine-wide execution settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfiguration {
    pub enable_validation: bool,
    pub enable_testing: bool,
    pub enable_error_correction: bool,
    /// Correction rounds allowed per failed step
    pub max_retries: u32,
    /// Per-task deadline, checked at step boundaries
    pub timeout_ms: u64,
    pub parallel_execution: bool,
    pub max_parallel_tasks: usize,
    /// Minimum validation confidence for a change to count as passing
    pub validation_threshold: f64,
    pub auto_fix_errors: bool,
}

impl Default for PipelineConfiguration {
    fn default() -> Self {
        Self {
            enable_validation: true,
            enable_testing: true,
            enable_error_correction: true,
            max_retries: 3,
            timeout_ms: 300_000,
            parallel_execution: false,
            max_parallel_tasks: 4,
            validation_threshold: 0.8,
            auto_fix_errors: true,
        }
    }
}

impl PipelineConfiguration {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.validation_threshold) {
            return Err(ConfigError::InvalidConfig(format!(
                "validation_threshold must be within [0, 1], got {}",
                self.validation_threshold
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_parallel_tasks == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_parallel_tasks must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a failed step is handed to the correction loop
    pub fn correction_enabled(&self) -> bool {
        self.enable_error_correction && self.auto_fix_errors && self.max_retries > 0
    }

    /// Apply a partial update, leaving `self` untouched if the result is invalid
    pub fn apply(&mut self, update: &ConfigurationUpdate) -> Result<(), ConfigError> {
        let mut next = self.clone();
        if let Some(v) = update.enable_validation {
            next.enable_validation = v;
        }
        if let Some(v) = update.enable_testing {
            next.enable_testing = v;
        }
        if let Some(v) = update.enable_error_correction {
            next.enable_error_correction = v;
        }
        if let Some(v) = update.max_retries {
            next.max_retries = v;
        }
        if let Some(v) = update.timeout_ms {
            next.timeout_ms = v;
        }
        if let Some(v) = update.parallel_execution {
            next.parallel_execution = v;
        }
        if let Some(v) = update.max_parallel_tasks {
            next.max_parallel_tasks = v;
        }
        if let Some(v) = update.validation_threshold {
            next.validation_threshold = v;
        }
        if let Some(v) = update.auto_fix_errors {
            next.auto_fix_errors = v;
        }

        next.validate()?;
        *self = next;
        Ok(())
    }
}

/// Partial `PipelineConfiguration`; `None` fields are left as they are
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfigurationUpdate {
    pub enable_validation: Option<bool>,
    pub enable_testing: Option<bool>,
    pub enable_error_correction: Option<bool>,
    pub max_retries: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub parallel_execution: Option<bool>,
    pub max_parallel_tasks: Option<usize>,
    pub validation_threshold: Option<f64>,
    pub auto_fix_errors: Option<bool>,
}

/// LLM section of the settings file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    /// Provider name; only "anthropic" is built in
    pub provider: String,
    pub model: String,
    /// Environment variable containing the API key
    pub api_key_env: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Optional temperature (0.0 to 1.0)
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Override of the provider's API base URL
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            system_prompt: None,
            temperature: Some(0.2),
            max_tokens: Some(4096),
            base_url: None,
        }
    }
}

/// Workspace section of the settings file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceSection {
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,
    /// Shell command that runs the project's tests
    #[serde(default)]
    pub test_command: Option<String>,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
            test_command: None,
        }
    }
}

/// Settings file read by the CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineSettings {
    #[serde(default)]
    pub pipeline: PipelineConfiguration,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub workspace: WorkspaceSection,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineSettings {
    /// Load and validate settings from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let settings: PipelineSettings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;

        if self.llm.provider != "anthropic" {
            return Err(ConfigError::InvalidConfig(format!(
                "Unsupported LLM provider: {}",
                self.llm.provider
            )));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "llm.model must not be empty".to_string(),
            ));
        }
        if let Some(temperature) = self.llm.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err(ConfigError::InvalidConfig(format!(
                    "llm.temperature must be within [0, 1], got {temperature}"
                )));
            }
        }
        if self.workspace.test_command.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(ConfigError::InvalidConfig(
                "workspace.test_command must not be empty when set".to_string(),
            ));
        }
        Ok(())
    }

    /// API key is resolved at runtime, never stored in the file
    pub fn get_llm_api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.llm.api_key_env)
            .map_err(|_| ConfigError::EnvVarNotFound(self.llm.api_key_env.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfiguration::default();
        assert!(config.enable_validation);
        assert!(config.enable_testing);
        assert!(config.enable_error_correction);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timeout_ms, 300_000);
        assert!(!config.parallel_execution);
        assert_eq!(config.validation_threshold, 0.8);
        assert!(config.auto_fix_errors);
        assert!(config.correction_enabled());
    }

    #[test]
    fn test_partial_update_changes_only_named_fields() {
        let mut config = PipelineConfiguration::default();
        let update = ConfigurationUpdate {
            max_retries: Some(1),
            enable_testing: Some(false),
            ..Default::default()
        };

        config.apply(&update).unwrap();
        assert_eq!(config.max_retries, 1);
        assert!(!config.enable_testing);
        assert!(config.enable_validation);
        assert_eq!(config.timeout_ms, 300_000);
    }

    #[test]
    fn test_rejected_update_leaves_config_untouched() {
        let mut config = PipelineConfiguration::default();
        let update = ConfigurationUpdate {
            max_retries: Some(7),
            validation_threshold: Some(1.5),
            ..Default::default()
        };

        assert!(matches!(
            config.apply(&update),
            Err(ConfigError::InvalidConfig(_))
        ));
        assert_eq!(config, PipelineConfiguration::default());
    }

    #[test]
    fn test_zero_retries_disables_correction() {
        let config = PipelineConfiguration {
            max_retries: 0,
            ..Default::default()
        };
        assert!(!config.correction_enabled());
    }

    #[test]
    fn test_settings_parse_with_sections() {
        let toml_content = r#"
[pipeline]
max_retries = 1
parallel_execution = true

[llm]
provider = "anthropic"
model = "claude-3-5-haiku-20241022"
api_key_env = "MY_KEY"
temperature = 0.1

[workspace]
root = "/tmp/project"
test_command = "cargo test"
"#;

        let settings: PipelineSettings = toml::from_str(toml_content).unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.pipeline.max_retries, 1);
        assert!(settings.pipeline.parallel_execution);
        assert!(settings.pipeline.enable_validation);
        assert_eq!(settings.llm.api_key_env, "MY_KEY");
        assert_eq!(settings.workspace.root, PathBuf::from("/tmp/project"));
        assert_eq!(settings.workspace.test_command.as_deref(), Some("cargo test"));
    }

    #[test]
    fn test_empty_settings_use_defaults() {
        let settings: PipelineSettings = toml::from_str("").unwrap();
        assert_eq!(settings, PipelineSettings::default());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let settings = PipelineSettings {
            llm: LlmSection {
                provider: "carrier-pigeon".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_api_key_env() {
        let settings = PipelineSettings {
            llm: LlmSection {
                api_key_env: "AGENTIC_PIPELINE_TEST_KEY_THAT_IS_NOT_SET".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            settings.get_llm_api_key(),
            Err(ConfigError::EnvVarNotFound(_))
        ));
    }
}
