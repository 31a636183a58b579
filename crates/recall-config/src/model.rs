// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Recall memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Recall configuration.
///
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RecallConfig {
    /// Workspace location and logging.
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Memory engine tunables.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Background worker pool settings.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// OpenAI-compatible embedding and completion endpoint.
    #[serde(default)]
    pub provider: ProviderConfig,
}

/// Where persistent memory lives.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    /// Root directory; memory lands under `<path>/memory/`.
    #[serde(default = "default_workspace_path")]
    pub path: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            path: default_workspace_path(),
            log_level: default_log_level(),
        }
    }
}

fn default_workspace_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("recall").display().to_string())
        .unwrap_or_else(|| "./recall-workspace".to_string())
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Extraction, consolidation, and indexing tunables.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Enable the memory system. When false, no memory operations occur.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Similarity above which a new fact is checked against existing ones.
    #[serde(default = "default_consolidation_threshold")]
    pub consolidation_threshold: f32,

    /// How many nearest facts are fetched as consolidation candidates.
    #[serde(default = "default_consolidation_candidates")]
    pub consolidation_candidates: usize,

    /// Time budget for the ADD/UPDATE/DELETE/NOOP decision call.
    #[serde(default = "default_decision_timeout_secs")]
    pub decision_timeout_secs: u64,

    /// Model used for extraction and consolidation. Falls back to
    /// `provider.chat_model` when unset.
    #[serde(default)]
    pub extraction_model: Option<String>,

    /// Cap on stored conversation text, in characters.
    #[serde(default = "default_conversation_max_runes")]
    pub conversation_max_runes: usize,

    /// Cap on the assistant reply passed to extraction, in characters.
    #[serde(default = "default_assistant_max_runes")]
    pub assistant_max_runes: usize,

    /// Inputs shorter than this never reach the extraction model.
    #[serde(default = "default_extraction_min_chars")]
    pub extraction_min_chars: usize,

    /// Window length for long specialist content, in characters.
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Overlap between consecutive windows, in characters.
    #[serde(default = "default_window_overlap")]
    pub window_overlap: usize,

    /// Hold a per-scope lock across search-then-write during consolidation.
    #[serde(default)]
    pub serialize_consolidation: bool,

    /// Extract entity relations alongside facts after each turn.
    #[serde(default = "default_true")]
    pub extract_relations: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            consolidation_threshold: default_consolidation_threshold(),
            consolidation_candidates: default_consolidation_candidates(),
            decision_timeout_secs: default_decision_timeout_secs(),
            extraction_model: None,
            conversation_max_runes: default_conversation_max_runes(),
            assistant_max_runes: default_assistant_max_runes(),
            extraction_min_chars: default_extraction_min_chars(),
            window_size: default_window_size(),
            window_overlap: default_window_overlap(),
            serialize_consolidation: false,
            extract_relations: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_consolidation_threshold() -> f32 {
    0.8
}

fn default_consolidation_candidates() -> usize {
    3
}

fn default_decision_timeout_secs() -> u64 {
    30
}

fn default_conversation_max_runes() -> usize {
    8000
}

fn default_assistant_max_runes() -> usize {
    2000
}

fn default_extraction_min_chars() -> usize {
    10
}

fn default_window_size() -> usize {
    1500
}

fn default_window_overlap() -> usize {
    200
}

/// Background worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Number of concurrent worker tasks.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Jobs that can wait before new submissions are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Upper bound on a single background job.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// How long shutdown waits for queued jobs before cancelling them.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            job_timeout_secs: default_job_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    256
}

fn default_job_timeout_secs() -> u64 {
    120
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

/// OpenAI-compatible endpoint used for embeddings and completions.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL including the version segment, e.g. `https://api.openai.com/v1`.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// API key. Falls back to the `OPENAI_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Chat model for extraction and consolidation decisions.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Embedding model.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Per-request HTTP timeout.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    60
}

impl RecallConfig {
    /// The model used for memory extraction calls.
    pub fn extraction_model(&self) -> &str {
        self.memory
            .extraction_model
            .as_deref()
            .unwrap_or(&self.provider.chat_model)
    }
}
