// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider adapter for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with scripted replies and
//! records every request it receives, so tests can assert on prompts.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use recall_core::RecallError;
use recall_core::traits::{PluginAdapter, ProviderAdapter};
use recall_core::types::{AdapterType, HealthStatus, ProviderRequest, ProviderResponse, TokenUsage};

/// Reply used once the scripted queue runs dry. An empty JSON array reads
/// as "nothing found" on every extraction path.
pub const DEFAULT_RESPONSE: &str = "[]";

/// A mock LLM provider that returns pre-configured responses.
///
/// Replies are popped from a FIFO queue; an entry can also be an error.
/// When the queue is empty, [`DEFAULT_RESPONSE`] is returned.
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<Result<String, String>>>>,
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl MockProvider {
    /// Create a new mock provider with an empty response queue.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            delay: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a mock provider pre-loaded with the given responses.
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().map(Ok).collect())),
            ..Self::new()
        }
    }

    /// Add a response to the end of the queue.
    pub async fn add_response(&self, text: String) {
        self.responses.lock().await.push_back(Ok(text));
    }

    /// Queue a failure; the matching call returns a provider error.
    pub async fn add_error(&self, message: &str) {
        self.responses.lock().await.push_back(Err(message.to_string()));
    }

    /// Sleep this long before answering each request.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.lock().await = Some(delay);
    }

    /// Every request received so far, oldest first.
    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// Scripted replies not yet consumed.
    pub async fn pending(&self) -> usize {
        self.responses.lock().await.len()
    }

    async fn next_response(&self) -> Result<String, String> {
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(DEFAULT_RESPONSE.to_string()))
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, RecallError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RecallError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, RecallError> {
        self.requests.lock().await.push(request.clone());

        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let text = self.next_response().await.map_err(|message| RecallError::Provider {
            message,
            source: None,
        })?;

        Ok(ProviderResponse {
            id: format!("mock-resp-{}", uuid::Uuid::new_v4()),
            content: text,
            model: request.model,
            stop_reason: Some("stop".to_string()),
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 20,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::types::ProviderMessage;

    fn request(prompt: &str) -> ProviderRequest {
        ProviderRequest {
            model: "test-model".to_string(),
            system_prompt: None,
            messages: vec![ProviderMessage::user(prompt)],
            max_tokens: 100,
            temperature: Some(0.1),
        }
    }

    #[tokio::test]
    async fn default_response_when_queue_empty() {
        let provider = MockProvider::new();
        let resp = provider.complete(request("hi")).await.unwrap();
        assert_eq!(resp.content, DEFAULT_RESPONSE);
    }

    #[tokio::test]
    async fn queued_responses_returned_in_order() {
        let provider = MockProvider::with_responses(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(provider.complete(request("a")).await.unwrap().content, "first");
        assert_eq!(provider.complete(request("b")).await.unwrap().content, "second");
        assert_eq!(provider.complete(request("c")).await.unwrap().content, DEFAULT_RESPONSE);
    }

    #[tokio::test]
    async fn errors_are_scripted_in_order() {
        let provider = MockProvider::new();
        provider.add_error("rate limited").await;
        provider.add_response("ok".to_string()).await;

        let err = provider.complete(request("a")).await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
        assert_eq!(provider.complete(request("b")).await.unwrap().content, "ok");
    }

    #[tokio::test]
    async fn requests_are_captured() {
        let provider = MockProvider::new();
        provider.complete(request("remember this")).await.unwrap();

        let captured = provider.requests().await;
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].messages[0].content, "remember this");
        assert_eq!(provider.request_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_applied() {
        let provider = MockProvider::new();
        provider.set_delay(Duration::from_secs(5)).await;
        let started = tokio::time::Instant::now();
        provider.complete(request("slow")).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
