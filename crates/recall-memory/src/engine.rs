// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Owned bundle wiring the store, extractor, relation log, and worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use recall_config::RecallConfig;
use recall_core::error::RecallError;
use recall_core::traits::{EmbeddingAdapter, ProviderAdapter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backfill::{BackfillOptions, BackfillStats, backfill};
use crate::extractor::{ExtractorSettings, IngestReport, KnowledgeExtractor};
use crate::format::format_results;
use crate::relations::{RelationStore, format_relations};
use crate::store::{SearchFilter, VectorStore};
use crate::types::{KnowledgeIndexOpts, MemoryResult};
use crate::worker::{MemoryWorker, TurnRecord};

/// The memory engine for one workspace.
pub struct MemoryEngine {
    store: Arc<VectorStore>,
    extractor: Arc<KnowledgeExtractor>,
    relations: Arc<RelationStore>,
    worker: MemoryWorker,
    workspace: PathBuf,
    enabled: bool,
    shutdown_grace: Duration,
}

impl MemoryEngine {
    /// Open the workspace named by `config` and start the background worker.
    pub async fn from_config(
        config: &RecallConfig,
        embedder: Arc<dyn EmbeddingAdapter>,
        provider: Arc<dyn ProviderAdapter>,
    ) -> Result<Self, RecallError> {
        let workspace = PathBuf::from(&config.workspace.path);
        let store = VectorStore::open(&workspace, embedder)
            .await?
            .with_conversation_max_runes(config.memory.conversation_max_runes);
        let relations = RelationStore::open_in_workspace(&workspace).await?;
        Ok(Self::assemble(config, workspace, store, relations, provider))
    }

    /// Wire pre-built stores. Must run inside a Tokio runtime.
    pub fn assemble(
        config: &RecallConfig,
        workspace: impl Into<PathBuf>,
        store: VectorStore,
        relations: RelationStore,
        provider: Arc<dyn ProviderAdapter>,
    ) -> Self {
        let store = Arc::new(store);
        let relations = Arc::new(relations);
        let settings = ExtractorSettings::from_config(&config.memory, config.extraction_model());
        let extractor = Arc::new(KnowledgeExtractor::new(provider, store.clone(), settings));

        let worker_relations = config.memory.extract_relations.then(|| relations.clone());
        let worker = MemoryWorker::spawn(
            store.clone(),
            extractor.clone(),
            worker_relations,
            &config.worker,
        );

        let workspace = workspace.into();
        info!(
            workspace = %workspace.display(),
            enabled = config.memory.enabled,
            model = %config.extraction_model(),
            "memory engine ready"
        );

        Self {
            store,
            extractor,
            relations,
            worker,
            workspace,
            enabled: config.memory.enabled,
            shutdown_grace: Duration::from_secs(config.worker.shutdown_grace_secs),
        }
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    pub fn extractor(&self) -> &Arc<KnowledgeExtractor> {
        &self.extractor
    }

    pub fn relations(&self) -> &Arc<RelationStore> {
        &self.relations
    }

    pub fn worker(&self) -> &MemoryWorker {
        &self.worker
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Hand a finished turn to the background worker.
    pub fn record_turn(&self, turn: TurnRecord) {
        if !self.enabled {
            debug!(session_key = %turn.session_key, "memory disabled, turn not recorded");
            return;
        }
        self.worker.record_turn(turn);
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: SearchFilter,
    ) -> Result<Vec<MemoryResult>, RecallError> {
        self.store.search(query, limit, filter).await
    }

    pub async fn search_scoped(
        &self,
        query: &str,
        limit: usize,
        specialist: &str,
    ) -> Result<Vec<MemoryResult>, RecallError> {
        self.store.search_knowledge_scoped(query, limit, specialist).await
    }

    /// Formatted memories for prompt injection.
    ///
    /// With a specialist, knowledge comes from the scoped blackboard search;
    /// otherwise both collections are searched.
    pub async fn recall_context(
        &self,
        query: &str,
        limit: usize,
        specialist: &str,
    ) -> Result<String, RecallError> {
        let results = if specialist.is_empty() {
            self.search(query, limit, SearchFilter::All).await?
        } else {
            self.search_scoped(query, limit, specialist).await?
        };
        Ok(format_results(&results))
    }

    /// Synchronously extract and consolidate a document.
    pub async fn ingest(
        &self,
        content: &str,
        default_category: &str,
        opts: &KnowledgeIndexOpts,
    ) -> Result<IngestReport, RecallError> {
        self.extractor
            .ingest_document(content, default_category, opts)
            .await
    }

    /// Formatted relations mentioning `entity`, visible to `specialist`.
    pub async fn describe_relations(&self, entity: &str, specialist: &str) -> String {
        format_relations(&self.relations.query_scoped(entity, specialist).await)
    }

    /// Backfill stored sessions into this engine's store.
    pub async fn backfill(
        &self,
        sessions_dir: &Path,
        opts: &BackfillOptions,
        cancel: &CancellationToken,
    ) -> Result<BackfillStats, (BackfillStats, RecallError)> {
        backfill(
            sessions_dir,
            &self.store,
            Some(self.extractor.as_ref()),
            opts,
            cancel,
        )
        .await
    }

    /// Drain background work using the configured grace period.
    pub async fn shutdown(&self) {
        self.worker.shutdown(self.shutdown_grace).await;
    }
}
