//! Test execution capability

use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    Unit,
    Integration,
}

/// A test derived from one changed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub file: String,
    pub kind: TestKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub passed: bool,
    pub duration_ms: u64,
    pub output: Option<String>,
}

#[async_trait]
pub trait TestRunner: Send + Sync {
    /// One outcome per case, in case order
    async fn run(&self, cases: &[TestCase]) -> Result<Vec<TestOutcome>, PipelineError>;
}

/// Runs one shell command for the whole suite and maps its exit status onto every case
pub struct CommandTestRunner {
    command: String,
    workdir: PathBuf,
    timeout: Duration,
    max_output: usize,
}

impl CommandTestRunner {
    pub fn new(command: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            workdir: workdir.into(),
            timeout: Duration::from_secs(600),
            max_output: 4000,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Keep the tail of long output, where test summaries live (pure function)
    fn tail(output: &str, max: usize) -> String {
        let count = output.chars().count();
        if count <= max {
            return output.to_string();
        }
        output.chars().skip(count - max).collect()
    }
}

#[async_trait]
impl TestRunner for CommandTestRunner {
    async fn run(&self, cases: &[TestCase]) -> Result<Vec<TestOutcome>, PipelineError> {
        if cases.is_empty() {
            return Ok(Vec::new());
        }

        debug!(command = %self.command, cases = cases.len(), "Running test command");
        let started = Instant::now();

        let mut command = tokio::process::Command::new("sh");
        command
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.workdir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                PipelineError::test_execution(format!(
                    "'{}' timed out after {}s",
                    self.command,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                PipelineError::test_execution(format!("cannot run '{}': {e}", self.command))
            })?;

        let duration_ms = started.elapsed().as_millis() as u64;
        let passed = output.status.success();
        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let summary = Self::tail(&combined, self.max_output);

        if !passed {
            warn!(command = %self.command, status = ?output.status.code(), "Test command failed");
        }

        Ok(cases
            .iter()
            .map(|case| TestOutcome {
                name: case.name.clone(),
                passed,
                duration_ms,
                output: Some(summary.clone()),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cases() -> Vec<TestCase> {
        vec![
            TestCase {
                name: "cache".to_string(),
                file: "src/cache.rs".to_string(),
                kind: TestKind::Unit,
            },
            TestCase {
                name: "api".to_string(),
                file: "tests/api.rs".to_string(),
                kind: TestKind::Integration,
            },
        ]
    }

    #[tokio::test]
    async fn test_passing_command_passes_every_case() {
        let dir = TempDir::new().unwrap();
        let runner = CommandTestRunner::new("echo ok", dir.path());

        let outcomes = runner.run(&cases()).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.passed));
        assert_eq!(outcomes[0].output.as_deref().map(str::trim), Some("ok"));
    }

    #[tokio::test]
    async fn test_failing_command_fails_every_case() {
        let dir = TempDir::new().unwrap();
        let runner = CommandTestRunner::new("exit 3", dir.path());

        let outcomes = runner.run(&cases()).await.unwrap();
        assert!(outcomes.iter().all(|o| !o.passed));
    }

    #[tokio::test]
    async fn test_no_cases_skips_command() {
        let runner = CommandTestRunner::new("exit 1", "/definitely/not/a/dir");
        assert!(runner.run(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_an_execution_error() {
        let dir = TempDir::new().unwrap();
        let runner =
            CommandTestRunner::new("sleep 5", dir.path()).with_timeout(Duration::from_millis(50));

        assert!(matches!(
            runner.run(&cases()).await,
            Err(PipelineError::TestExecution { .. })
        ));
    }

    #[test]
    fn test_tail_keeps_end() {
        assert_eq!(CommandTestRunner::tail("abcdef", 3), "def");
        assert_eq!(CommandTestRunner::tail("ab", 3), "ab");
    }
}
