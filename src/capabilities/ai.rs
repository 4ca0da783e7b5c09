//! AI completion capability: prompt in, text out

use crate::config::LlmSection;
use crate::llm::{CompletionRequest, LlmError, LlmProvider};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// The only thing the pipeline asks of a model
#[async_trait]
pub trait AiCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Adapts any `LlmProvider` to `AiCompletion` with fixed request parameters
pub struct ProviderCompletion {
    provider: Arc<dyn LlmProvider>,
    model: String,
    system_prompt: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl ProviderCompletion {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            system_prompt: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn from_settings(provider: Arc<dyn LlmProvider>, llm: &LlmSection) -> Self {
        Self {
            provider,
            model: llm.model.clone(),
            system_prompt: llm.system_prompt.clone(),
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

#[async_trait]
impl AiCompletion for ProviderCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let mut request =
            CompletionRequest::from_prompt(&self.model, self.system_prompt.as_deref(), prompt);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        let response = self.provider.complete(request).await?;
        debug!(
            provider = self.provider.name(),
            model = %response.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "AI completion finished"
        );

        response
            .content
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("completion had no text content".to_string()))
    }
}
