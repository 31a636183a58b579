// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible adapters for the Recall memory engine.
//!
//! [`OpenAiProvider`] implements [`ProviderAdapter`] over `/chat/completions`
//! and [`OpenAiEmbedder`] implements [`EmbeddingAdapter`] over `/embeddings`.
//! Any server speaking the same wire format works.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use recall_config::RecallConfig;
use recall_core::error::RecallError;
use recall_core::traits::{EmbeddingAdapter, PluginAdapter, ProviderAdapter};
use recall_core::types::{
    AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus, ProviderRequest, ProviderResponse,
    TokenUsage,
};
use tracing::{debug, info};

use crate::client::{ApiError, OpenAiClient};
use crate::types::{ChatMessage, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse};

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// API key resolution order: config, then `OPENAI_API_KEY`.
pub fn resolve_api_key(configured: Option<&str>) -> Option<String> {
    configured
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
}

fn client_from_config(config: &RecallConfig) -> Result<OpenAiClient, ApiError> {
    let api_key = resolve_api_key(config.provider.api_key.as_deref());
    OpenAiClient::new(
        &config.provider.api_base,
        api_key.as_deref(),
        Duration::from_secs(config.provider.timeout_secs),
    )
}

fn provider_error(e: ApiError) -> RecallError {
    RecallError::Provider {
        message: e.to_string(),
        source: Some(Box::new(e)),
    }
}

fn embedding_error(e: ApiError) -> RecallError {
    RecallError::Embedding {
        message: e.to_string(),
        source: Some(Box::new(e)),
    }
}

/// Chat completion provider implementing [`ProviderAdapter`].
pub struct OpenAiProvider {
    client: OpenAiClient,
}

impl OpenAiProvider {
    pub fn new(config: &RecallConfig) -> Result<Self, RecallError> {
        let client = client_from_config(config).map_err(provider_error)?;
        info!(base_url = %client.base_url(), model = %config.extraction_model(), "completion provider initialized");
        Ok(Self { client })
    }

    /// Creates a provider with an existing client.
    pub fn with_client(client: OpenAiClient) -> Self {
        Self { client }
    }

    fn to_chat_request(request: ProviderRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system_prompt.filter(|s| !s.is_empty()) {
            messages.push(ChatMessage {
                role: "system".into(),
                content: Some(system),
            });
        }
        messages.extend(request.messages.into_iter().map(|m| ChatMessage {
            role: m.role,
            content: Some(m.content),
        }));

        ChatRequest {
            model: request.model,
            messages,
            max_tokens: (request.max_tokens > 0).then_some(request.max_tokens),
            temperature: request.temperature,
        }
    }
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
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
        debug!("completion provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, RecallError> {
        let chat = Self::to_chat_request(request);
        let response: ChatResponse = self
            .client
            .post_json("/chat/completions", &chat)
            .await
            .map_err(provider_error)?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RecallError::Provider {
                message: "completion returned no choices".into(),
                source: None,
            })?;
        let usage = response.usage.unwrap_or_default();

        Ok(ProviderResponse {
            id: response.id,
            content: choice.message.content.unwrap_or_default(),
            model: response.model,
            stop_reason: choice.finish_reason,
            usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        })
    }
}

/// Embedding function implementing [`EmbeddingAdapter`].
pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(config: &RecallConfig) -> Result<Self, RecallError> {
        let client = client_from_config(config).map_err(embedding_error)?;
        info!(base_url = %client.base_url(), model = %config.provider.embedding_model, "embedding function initialized");
        Ok(Self {
            client,
            model: config.provider.embedding_model.clone(),
        })
    }

    /// Creates an embedder with an existing client.
    pub fn with_client(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl PluginAdapter for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai-embeddings"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, RecallError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RecallError> {
        debug!("embedding function shutting down");
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for OpenAiEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, RecallError> {
        if input.texts.is_empty() {
            return Ok(EmbeddingOutput {
                embeddings: Vec::new(),
                dimensions: 0,
            });
        }

        let expected = input.texts.len();
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: input.texts,
        };
        let mut response: EmbeddingResponse = self
            .client
            .post_json("/embeddings", &request)
            .await
            .map_err(embedding_error)?;

        if response.data.len() != expected {
            return Err(RecallError::Embedding {
                message: format!(
                    "expected {expected} embeddings, received {}",
                    response.data.len()
                ),
                source: None,
            });
        }

        response.data.sort_by_key(|d| d.index);
        let embeddings: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();
        let dimensions = embeddings.first().map(Vec::len).unwrap_or_default();
        Ok(EmbeddingOutput {
            embeddings,
            dimensions,
        })
    }
}
