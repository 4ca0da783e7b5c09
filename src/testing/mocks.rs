//! Mock implementations for testing
//!
//! Doubles for every collaborator the pipeline talks to, so the engine can be
//! exercised end to end without a model, a repository or a test suite.

use crate::capabilities::{
    analyze_source, AiCompletion, ApplyReport, FileAnalysis, FileEditApplier, RepositoryIndex,
    RepositoryStats, TestCase, TestOutcome, TestRunner, Validator,
};
use crate::error::PipelineError;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenUsage,
};
use crate::progress::{ProgressEvent, ProgressEventType, ProgressSink};
use crate::task::{
    FileChange, FindingSeverity, ValidationError, ValidationErrorKind, ValidationWarning,
    ValidationWarningKind,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Lock a mock's state; a panicked test thread must not hide the state from others
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Which handler a prompt was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Planning,
    Implementation,
    Documentation,
    Correction,
    Other,
}

impl PromptKind {
    pub fn of(prompt: &str) -> Self {
        if prompt.starts_with("You are planning") {
            PromptKind::Planning
        } else if prompt.starts_with("You are implementing") {
            PromptKind::Implementation
        } else if prompt.starts_with("You are writing documentation") {
            PromptKind::Documentation
        } else if prompt.starts_with("A pipeline step failed") {
            PromptKind::Correction
        } else {
            PromptKind::Other
        }
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

/// Blocks the first matching AI call until released
#[derive(Debug, Default)]
pub struct AiGate {
    entered: Notify,
    release: Notify,
    used: AtomicBool,
}

impl AiGate {
    /// Wait until a gated call is in flight
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// AI double answering from per-prompt-kind scripts
///
/// Replies for a kind are consumed in order; the last one repeats. A kind
/// without replies fails with `LlmError::InvalidResponse`.
#[derive(Debug, Default)]
pub struct ScriptedAi {
    replies: Mutex<HashMap<PromptKind, VecDeque<Reply>>>,
    prompts: Mutex<Vec<String>>,
    gate: Option<(PromptKind, Arc<AiGate>)>,
}

impl ScriptedAi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, kind: PromptKind, response: impl Into<String>) -> Self {
        lock(&self.replies)
            .entry(kind)
            .or_default()
            .push_back(Reply::Text(response.into()));
        self
    }

    pub fn fail_on(self, kind: PromptKind, message: impl Into<String>) -> Self {
        lock(&self.replies)
            .entry(kind)
            .or_default()
            .push_back(Reply::Fail(message.into()));
        self
    }

    /// Gate the first call of `kind`; the returned handle releases it
    pub fn gated(mut self, kind: PromptKind) -> (Self, Arc<AiGate>) {
        let gate = Arc::new(AiGate::default());
        self.gate = Some((kind, Arc::clone(&gate)));
        (self, gate)
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    pub fn calls(&self, kind: PromptKind) -> usize {
        lock(&self.prompts)
            .iter()
            .filter(|prompt| PromptKind::of(prompt) == kind)
            .count()
    }

    fn next_reply(&self, kind: PromptKind) -> Option<Reply> {
        let mut replies = lock(&self.replies);
        let queue = replies.get_mut(&kind)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl AiCompletion for ScriptedAi {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let kind = PromptKind::of(prompt);
        lock(&self.prompts).push(prompt.to_string());

        if let Some((gated_kind, gate)) = &self.gate {
            if *gated_kind == kind && !gate.used.swap(true, Ordering::SeqCst) {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
        }

        match self.next_reply(kind) {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(message)) => Err(LlmError::RequestFailed(message)),
            None => Err(LlmError::InvalidResponse(format!(
                "no scripted reply for {kind:?} prompt"
            ))),
        }
    }
}

/// Mock LLM provider for testing
#[derive(Debug, Default)]
pub struct MockLlmProvider {
    pub responses: Vec<String>,
    pub should_fail: bool,
    current_response: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            ..Default::default()
        }
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn available_models(&self) -> Vec<String> {
        vec!["mock-model".to_string()]
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        lock(&self.requests).push(request);
        if self.should_fail {
            return Err(LlmError::RequestFailed("Mock LLM failure".to_string()));
        }

        let index = self.current_response.fetch_add(1, Ordering::SeqCst);
        let content = if self.responses.is_empty() {
            "Mock response".to_string()
        } else {
            self.responses[index % self.responses.len()].clone()
        };

        Ok(CompletionResponse {
            content: Some(content),
            model: "mock-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: FinishReason::Stop,
            metadata: HashMap::new(),
        })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        if self.should_fail {
            Err(LlmError::RequestFailed(
                "Mock health check failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

/// In-memory repository index over a fixed set of files
#[derive(Debug, Default)]
pub struct MockRepositoryIndex {
    files: BTreeMap<String, String>,
    should_fail: bool,
}

impl MockRepositoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Every query fails with a repository index error
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    fn check(&self) -> Result<(), PipelineError> {
        if self.should_fail {
            Err(PipelineError::repository_index("mock index unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RepositoryIndex for MockRepositoryIndex {
    async fn analyze_file(&self, path: &str) -> Result<FileAnalysis, PipelineError> {
        self.check()?;
        self.files
            .get(path)
            .map(|content| analyze_source(path, content))
            .ok_or_else(|| PipelineError::repository_index(format!("{path} is not indexed")))
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>, PipelineError> {
        self.check()?;
        Ok(self.files.get(path).cloned())
    }

    async fn architecture_summary(&self) -> Result<String, PipelineError> {
        self.check()?;
        Ok(format!("{} mock modules", self.files.len()))
    }

    async fn naming_conventions(&self) -> Result<String, PipelineError> {
        self.check()?;
        Ok("functions: snake_case; types: PascalCase".to_string())
    }

    async fn stats(&self) -> Result<RepositoryStats, PipelineError> {
        self.check()?;
        let analyses: Vec<FileAnalysis> = self
            .files
            .iter()
            .map(|(path, content)| analyze_source(path, content))
            .collect();
        let total_files = analyses.len();
        let average_complexity = if total_files == 0 {
            0.0
        } else {
            analyses.iter().map(|a| f64::from(a.complexity)).sum::<f64>() / total_files as f64
        };

        Ok(RepositoryStats {
            total_files,
            total_lines: analyses.iter().map(|a| a.lines).sum(),
            total_elements: analyses.iter().map(FileAnalysis::element_count).sum(),
            average_complexity,
        })
    }

    async fn dependents_of(&self, path: &str) -> Result<Vec<String>, PipelineError> {
        self.check()?;
        let Some(stem) = Path::new(path).file_stem().and_then(|s| s.to_str()) else {
            return Ok(Vec::new());
        };

        Ok(self
            .files
            .iter()
            .filter(|(other, _)| other.as_str() != path)
            .filter(|(other, content)| {
                analyze_source(other, content)
                    .imports
                    .iter()
                    .any(|import| import.contains(stem))
            })
            .map(|(other, _)| other.clone())
            .collect())
    }
}

/// Validator with a fixed number of findings per check category
#[derive(Debug, Default)]
pub struct MockValidator {
    errors: HashMap<String, usize>,
    warnings: HashMap<String, usize>,
    failing: HashSet<String>,
}

impl MockValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `category` is one of syntax, semantic or security
    pub fn with_errors(mut self, category: &str, count: usize) -> Self {
        self.errors.insert(category.to_string(), count);
        self
    }

    /// `category` is one of style or performance
    pub fn with_warnings(mut self, category: &str, count: usize) -> Self {
        self.warnings.insert(category.to_string(), count);
        self
    }

    pub fn failing(mut self, category: &str) -> Self {
        self.failing.insert(category.to_string());
        self
    }

    fn errors_for(
        &self,
        category: &str,
        kind: ValidationErrorKind,
        changes: &[FileChange],
    ) -> Result<Vec<ValidationError>, PipelineError> {
        if self.failing.contains(category) {
            return Err(PipelineError::internal_error(format!("{category} check crashed")));
        }
        let file = changes.first().map(|c| c.path.clone()).unwrap_or_default();
        Ok((0..self.errors.get(category).copied().unwrap_or(0))
            .map(|i| ValidationError {
                kind,
                message: format!("mock {category} error {i}"),
                file: file.clone(),
                line: i + 1,
                column: 1,
                severity: FindingSeverity::Error,
            })
            .collect())
    }

    fn warnings_for(
        &self,
        category: &str,
        kind: ValidationWarningKind,
        changes: &[FileChange],
    ) -> Result<Vec<ValidationWarning>, PipelineError> {
        if self.failing.contains(category) {
            return Err(PipelineError::internal_error(format!("{category} check crashed")));
        }
        let file = changes.first().map(|c| c.path.clone()).unwrap_or_default();
        Ok((0..self.warnings.get(category).copied().unwrap_or(0))
            .map(|i| ValidationWarning {
                kind,
                message: format!("mock {category} warning {i}"),
                file: file.clone(),
                line: i + 1,
                column: 1,
                suggestion: Some(format!("Resolve {category} warning {i}")),
            })
            .collect())
    }
}

#[async_trait]
impl Validator for MockValidator {
    async fn check_syntax(
        &self,
        changes: &[FileChange],
    ) -> Result<Vec<ValidationError>, PipelineError> {
        self.errors_for("syntax", ValidationErrorKind::Syntax, changes)
    }

    async fn check_semantics(
        &self,
        changes: &[FileChange],
    ) -> Result<Vec<ValidationError>, PipelineError> {
        self.errors_for("semantic", ValidationErrorKind::Semantic, changes)
    }

    async fn check_style(
        &self,
        changes: &[FileChange],
    ) -> Result<Vec<ValidationWarning>, PipelineError> {
        self.warnings_for("style", ValidationWarningKind::Style, changes)
    }

    async fn check_performance(
        &self,
        changes: &[FileChange],
    ) -> Result<Vec<ValidationWarning>, PipelineError> {
        self.warnings_for("performance", ValidationWarningKind::Performance, changes)
    }

    async fn check_security(
        &self,
        changes: &[FileChange],
    ) -> Result<Vec<ValidationError>, PipelineError> {
        self.errors_for("security", ValidationErrorKind::Security, changes)
    }
}

/// Edit applier that records calls and reports scripted conflicts
///
/// Each queued conflict list is used for one call, then calls succeed.
#[derive(Debug, Default)]
pub struct MockEditApplier {
    conflicts: Mutex<VecDeque<Vec<String>>>,
    calls: Mutex<Vec<(Vec<FileChange>, bool)>>,
}

impl MockEditApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conflict_once(self, conflict: impl Into<String>) -> Self {
        lock(&self.conflicts).push_back(vec![conflict.into()]);
        self
    }

    /// Recorded `(changes, dry_run)` pairs
    pub fn calls(&self) -> Vec<(Vec<FileChange>, bool)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl FileEditApplier for MockEditApplier {
    async fn apply(
        &self,
        changes: &[FileChange],
        dry_run: bool,
    ) -> Result<ApplyReport, PipelineError> {
        lock(&self.calls).push((changes.to_vec(), dry_run));

        let conflicts = lock(&self.conflicts).pop_front().unwrap_or_default();
        let success = conflicts.is_empty();
        let applied = if success && !dry_run {
            changes.iter().map(|c| c.path.clone()).collect()
        } else {
            Vec::new()
        };

        Ok(ApplyReport {
            success,
            conflicts,
            warnings: Vec::new(),
            applied,
        })
    }
}

/// Test runner whose outcomes are decided by file path
#[derive(Debug, Default)]
pub struct MockTestRunner {
    failing_files: HashSet<String>,
    should_fail: bool,
    should_panic: bool,
    runs: Mutex<Vec<Vec<TestCase>>>,
}

impl MockTestRunner {
    pub fn passing() -> Self {
        Self::default()
    }

    pub fn failing_files(files: &[&str]) -> Self {
        Self {
            failing_files: files.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    /// The runner itself errors
    pub fn broken() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// The runner panics mid-run
    pub fn panicking() -> Self {
        Self {
            should_panic: true,
            ..Default::default()
        }
    }

    pub fn runs(&self) -> Vec<Vec<TestCase>> {
        lock(&self.runs).clone()
    }
}

#[async_trait]
impl TestRunner for MockTestRunner {
    async fn run(&self, cases: &[TestCase]) -> Result<Vec<TestOutcome>, PipelineError> {
        lock(&self.runs).push(cases.to_vec());
        if self.should_panic {
            panic!("mock runner crashed");
        }
        if self.should_fail {
            return Err(PipelineError::test_execution("mock runner unavailable"));
        }

        Ok(cases
            .iter()
            .map(|case| {
                let passed = !self.failing_files.contains(&case.file);
                TestOutcome {
                    name: case.name.clone(),
                    passed,
                    duration_ms: 1,
                    output: (!passed).then(|| format!("{} failed", case.name)),
                }
            })
            .collect())
    }
}

/// Progress sink that keeps every event
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        lock(&self.events).clone()
    }

    pub fn event_types(&self) -> Vec<ProgressEventType> {
        lock(&self.events).iter().map(|e| e.event_type).collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        lock(&self.events).push(event);
    }
}
