// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end memory tests.
//!
//! `TestHarness` assembles a complete [`MemoryEngine`] over a temporary
//! workspace with mock embedding and completion adapters.

use std::path::Path;
use std::sync::Arc;

use recall_config::RecallConfig;
use recall_core::RecallError;
use recall_memory::MemoryEngine;

use crate::mock_embedder::MockEmbedder;
use crate::mock_provider::MockProvider;

type ConfigHook = Box<dyn FnOnce(&mut RecallConfig) + Send>;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    responses: Vec<String>,
    configure: Vec<ConfigHook>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            responses: Vec::new(),
            configure: Vec::new(),
        }
    }

    /// Set mock provider responses.
    pub fn with_mock_responses(mut self, responses: Vec<String>) -> Self {
        self.responses = responses;
        self
    }

    /// Adjust the configuration before the engine is built. The workspace
    /// path is always overridden with the harness's temp directory.
    pub fn with_config(mut self, hook: impl FnOnce(&mut RecallConfig) + Send + 'static) -> Self {
        self.configure.push(Box::new(hook));
        self
    }

    /// Build the harness and start the engine's background worker.
    pub async fn build(self) -> Result<TestHarness, RecallError> {
        let temp_dir = tempfile::TempDir::new().map_err(RecallError::storage)?;

        let mut config = RecallConfig::default();
        config.provider.chat_model = "mock-model".to_string();
        for hook in self.configure {
            hook(&mut config);
        }
        config.workspace.path = temp_dir.path().display().to_string();

        let provider = Arc::new(MockProvider::with_responses(self.responses));
        let embedder = Arc::new(MockEmbedder::new());
        let engine = MemoryEngine::from_config(&config, embedder.clone(), provider.clone()).await?;

        Ok(TestHarness {
            engine,
            provider,
            embedder,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A memory engine over a temp workspace with mock adapters.
pub struct TestHarness {
    pub engine: MemoryEngine,
    /// The mock LLM provider.
    pub provider: Arc<MockProvider>,
    /// The mock embedding function.
    pub embedder: Arc<MockEmbedder>,
    pub config: RecallConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn workspace(&self) -> &Path {
        self.engine.workspace()
    }

    /// Add a response to the mock provider's queue.
    pub async fn add_provider_response(&self, text: impl Into<String>) {
        self.provider.add_response(text.into()).await;
    }

    /// Drain all background work so its effects are visible.
    pub async fn settle(&self) {
        self.engine.shutdown().await;
    }
}
