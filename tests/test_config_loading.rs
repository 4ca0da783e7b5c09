//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of settings loading, validation, and error handling.

use agentic_pipeline::config::{ConfigError, PipelineConfiguration, PipelineSettings};
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn settings_file(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_settings_load_from_valid_toml() {
    let temp_file = settings_file(
        r#"
[pipeline]
enable_testing = false
max_retries = 1
timeout_ms = 60000
parallel_execution = true
max_parallel_tasks = 2
validation_threshold = 0.9

[llm]
provider = "anthropic"
model = "claude-sonnet-4-20250514"
api_key_env = "ANTHROPIC_API_KEY"
system_prompt = "You are a careful engineer."
temperature = 0.1
max_tokens = 2048

[workspace]
root = "/srv/project"
test_command = "cargo test"
"#,
    );

    let settings = PipelineSettings::load_from_file(temp_file.path()).unwrap();

    assert!(!settings.pipeline.enable_testing);
    assert!(settings.pipeline.enable_validation);
    assert_eq!(settings.pipeline.max_retries, 1);
    assert_eq!(settings.pipeline.timeout_ms, 60_000);
    assert!(settings.pipeline.parallel_execution);
    assert_eq!(settings.pipeline.validation_threshold, 0.9);
    assert_eq!(settings.llm.model, "claude-sonnet-4-20250514");
    assert_eq!(
        settings.llm.system_prompt.as_deref(),
        Some("You are a careful engineer.")
    );
    assert_eq!(settings.workspace.root, PathBuf::from("/srv/project"));
    assert_eq!(settings.workspace.test_command.as_deref(), Some("cargo test"));
}

#[test]
fn test_empty_file_yields_defaults() {
    let temp_file = settings_file("");

    let settings = PipelineSettings::load_from_file(temp_file.path()).unwrap();

    assert_eq!(settings.pipeline, PipelineConfiguration::default());
    assert_eq!(settings.llm.provider, "anthropic");
    assert_eq!(settings.workspace.root, PathBuf::from("."));
    assert!(settings.workspace.test_command.is_none());
}

#[test]
fn test_out_of_range_threshold_is_rejected() {
    let temp_file = settings_file("[pipeline]\nvalidation_threshold = 1.2\n");

    let result = PipelineSettings::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_unknown_provider_is_rejected() {
    let temp_file = settings_file(
        r#"
[llm]
provider = "carrier-pigeon"
model = "coo-1"
api_key_env = "PIGEON_KEY"
"#,
    );

    let result = PipelineSettings::load_from_file(temp_file.path());
    assert!(matches!(
        result,
        Err(ConfigError::InvalidConfig(ref message)) if message.contains("carrier-pigeon")
    ));
}

#[test]
fn test_malformed_toml_is_a_parse_error() {
    let temp_file = settings_file("[pipeline\nmax_retries = ");

    let result = PipelineSettings::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_missing_file_is_a_read_error() {
    let missing = std::path::Path::new("/nonexistent/pipeline.toml");
    let result = PipelineSettings::load_from_file(missing);
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_api_key_comes_from_environment() {
    let temp_file = settings_file(
        r#"
[llm]
provider = "anthropic"
model = "claude-sonnet-4-20250514"
api_key_env = "AGENTIC_PIPELINE_TEST_KEY_UNSET"
"#,
    );
    let settings = PipelineSettings::load_from_file(temp_file.path()).unwrap();

    assert!(matches!(
        settings.get_llm_api_key(),
        Err(ConfigError::EnvVarNotFound(ref name)) if name == "AGENTIC_PIPELINE_TEST_KEY_UNSET"
    ));
}
