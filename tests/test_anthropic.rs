//! Integration tests for the Anthropic provider
//!
//! Tests behavioral contracts against a mock HTTP server:
//! - API request/response handling
//! - Error scenarios (rate limits, auth failures)
//! - The provider driving a whole task through the AI capability


use agentic_pipeline::capabilities::{AiCompletion, ProviderCompletion};
use agentic_pipeline::config::LlmSection;
use agentic_pipeline::llm::provider::{CompletionRequest, FinishReason, LlmError, LlmProvider};
use agentic_pipeline::llm::providers::anthropic::{AnthropicConfig, AnthropicProvider};
use agentic_pipeline::testing::{MockEditApplier, MockRepositoryIndex, MockValidator};
use agentic_pipeline::{Collaborators, TaskPipeline, TaskStatus};
use std::sync::Arc;
use std::time::Duration;
use test_helpers::*;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str) -> AnthropicConfig {
    AnthropicConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
        version: "2023-06-01".to_string(),
    }
}

fn text_response(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "msg_123",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": text}],
        "model": "claude-3-5-haiku-20241022",
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 10, "output_tokens": 15}
    })
}

#[tokio::test]
async fn test_anthropic_provider_returns_successful_completion() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "test-api-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_response("Hello there")))
        .mount(&mock_server)
        .await;

    let provider = AnthropicProvider::new(test_config(&mock_server.uri())).unwrap();
    let response = provider
        .complete(CompletionRequest::from_prompt(
            "claude-3-5-haiku-20241022",
            None,
            "Hello",
        ))
        .await
        .unwrap();

    assert_eq!(response.content.as_deref(), Some("Hello there"));
    assert_eq!(response.finish_reason, FinishReason::Stop);
    assert_eq!(response.usage.prompt_tokens, 10);
    assert_eq!(response.usage.completion_tokens, 15);
    assert_eq!(response.usage.total_tokens, 25);
}

#[tokio::test]
async fn test_settings_are_sent_with_every_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(body_partial_json(serde_json::json!({
            "model": "claude-sonnet-4-20250514",
            "system": "You write careful code.",
            "max_tokens": 512
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_response("ok")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = Arc::new(AnthropicProvider::new(test_config(&mock_server.uri())).unwrap());
    let llm = LlmSection {
        system_prompt: Some("You write careful code.".to_string()),
        max_tokens: Some(512),
        ..Default::default()
    };
    let ai = ProviderCompletion::from_settings(provider, &llm);

    assert_eq!(ai.complete("Say ok").await.unwrap(), "ok");
}

#[tokio::test]
async fn test_rate_limit_is_reported() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&mock_server)
        .await;

    let provider = AnthropicProvider::new(test_config(&mock_server.uri())).unwrap();
    let result = provider
        .complete(CompletionRequest::from_prompt("claude-3-5-haiku-20241022", None, "Hi"))
        .await;

    assert!(matches!(result, Err(LlmError::RateLimitExceeded(body)) if body == "slow down"));
}

#[tokio::test]
async fn test_authentication_failure_is_reported() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .mount(&mock_server)
        .await;

    let provider = AnthropicProvider::new(test_config(&mock_server.uri())).unwrap();
    assert!(matches!(
        provider.health_check().await,
        Err(LlmError::AuthenticationFailed(_))
    ));
}

#[tokio::test]
async fn test_response_without_text_is_invalid() {
    let mock_server = MockServer::start().await;

    let body = serde_json::json!({
        "content": [],
        "model": "claude-3-5-haiku-20241022",
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 3, "output_tokens": 0}
    });
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&mock_server)
        .await;

    let provider = AnthropicProvider::new(test_config(&mock_server.uri())).unwrap();
    let result = provider
        .complete(CompletionRequest::from_prompt("claude-3-5-haiku-20241022", None, "Hi"))
        .await;
    assert!(matches!(result, Err(LlmError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_analysis_task_through_anthropic_backend() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(text_response(&documentation_reply())),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = Arc::new(AnthropicProvider::new(test_config(&mock_server.uri())).unwrap());
    let collaborators = Collaborators {
        ai: Arc::new(ProviderCompletion::new(provider, "claude-3-5-haiku-20241022")),
        index: Arc::new(MockRepositoryIndex::new().with_file("src/cache.rs", CACHE_SOURCE)),
        validator: Arc::new(MockValidator::new()),
        applier: Arc::new(MockEditApplier::new()),
        test_runner: None,
    };
    let pipeline = TaskPipeline::new(test_helpers::test_config(), collaborators).unwrap();

    let id = pipeline.create_task(cache_request("analysis")).await.unwrap();
    let task = pipeline.wait_for_task(id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.last_documentation().unwrap().sections.len(), 2);
}
