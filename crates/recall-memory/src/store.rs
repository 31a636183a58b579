// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector store holding the `conversations` and `knowledge` collections.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use recall_core::error::RecallError;
use recall_core::traits::EmbeddingAdapter;
use tracing::{debug, error, info, warn};

use crate::blackboard;
use crate::collection::{Collection, SqliteCollection, open_database, open_in_memory};
use crate::metrics;
use crate::types::{
    Document, KnowledgeIndexOpts, Metadata, MetadataFilter, MemoryResult, MemorySource, keys,
    truncate_runes,
};

/// Name of the collection holding raw conversation turns.
pub const CONVERSATIONS: &str = "conversations";

/// Name of the collection holding distilled facts.
pub const KNOWLEDGE: &str = "knowledge";

/// Default cap on stored conversation text, in characters.
pub const DEFAULT_CONVERSATION_MAX_RUNES: usize = 8000;

/// Which collections a merged [`VectorStore::search`] covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFilter {
    All,
    Conversations,
    Knowledge,
}

impl std::str::FromStr for SearchFilter {
    type Err = RecallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "all" => Ok(SearchFilter::All),
            "conversations" => Ok(SearchFilter::Conversations),
            "knowledge" => Ok(SearchFilter::Knowledge),
            other => Err(RecallError::InvalidArgument(format!(
                "unknown filter: {other} (use: all, conversations, knowledge)"
            ))),
        }
    }
}

/// Persistent semantic store over two named collections.
///
/// Conversation turns are append-only. Knowledge facts are replaced by
/// delete-then-insert during consolidation.
pub struct VectorStore {
    conversations: Arc<dyn Collection>,
    knowledge: Arc<dyn Collection>,
    conversation_max_runes: usize,
    last_knowledge_nanos: AtomicI64,
}

impl VectorStore {
    /// Build a store over caller-supplied collections.
    pub fn new(conversations: Arc<dyn Collection>, knowledge: Arc<dyn Collection>) -> Self {
        Self {
            conversations,
            knowledge,
            conversation_max_runes: DEFAULT_CONVERSATION_MAX_RUNES,
            last_knowledge_nanos: AtomicI64::new(0),
        }
    }

    /// Open the persistent store under `<workspace>/memory/vectors/`.
    pub async fn open(
        workspace: &Path,
        embedder: Arc<dyn EmbeddingAdapter>,
    ) -> Result<Self, RecallError> {
        let dir = vectors_dir(workspace);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(RecallError::storage)?;

        let conn = open_database(&dir.join("memory.db")).await?;
        let store = Self::new(
            Arc::new(SqliteCollection::new(CONVERSATIONS, conn.clone(), embedder.clone())),
            Arc::new(SqliteCollection::new(KNOWLEDGE, conn, embedder)),
        );

        let conversations_count = store.conversation_count().await?;
        let knowledge_count = store.knowledge_count().await?;
        info!(
            path = %dir.display(),
            conversations_count,
            knowledge_count,
            "vector store initialized"
        );
        Ok(store)
    }

    /// A store backed by an in-memory database.
    pub async fn in_memory(embedder: Arc<dyn EmbeddingAdapter>) -> Result<Self, RecallError> {
        let conn = open_in_memory().await?;
        Ok(Self::new(
            Arc::new(SqliteCollection::new(CONVERSATIONS, conn.clone(), embedder.clone())),
            Arc::new(SqliteCollection::new(KNOWLEDGE, conn, embedder)),
        ))
    }

    /// Override the conversation text cap.
    pub fn with_conversation_max_runes(mut self, max: usize) -> Self {
        self.conversation_max_runes = max;
        self
    }

    pub async fn conversation_count(&self) -> Result<usize, RecallError> {
        self.conversations.count().await
    }

    pub async fn knowledge_count(&self) -> Result<usize, RecallError> {
        self.knowledge.count().await
    }

    /// Index one conversation turn. Failures are logged, never returned.
    pub async fn index_conversation(
        &self,
        session_key: &str,
        channel: &str,
        chat_id: &str,
        user_msg: &str,
        assistant_msg: &str,
    ) {
        self.index_conversation_at(session_key, channel, chat_id, user_msg, assistant_msg, Utc::now())
            .await;
    }

    /// Index one conversation turn stamped with an explicit time.
    pub async fn index_conversation_at(
        &self,
        session_key: &str,
        channel: &str,
        chat_id: &str,
        user_msg: &str,
        assistant_msg: &str,
        at: DateTime<Utc>,
    ) {
        let doc_id = format!("{session_key}:{}", at.timestamp());
        let content = format!("User: {user_msg}\nAssistant: {assistant_msg}");
        let content = truncate_runes(&content, self.conversation_max_runes).to_string();
        let content_len = content.len();

        let mut metadata = Metadata::new();
        metadata.insert(keys::SESSION_KEY.into(), session_key.into());
        metadata.insert(keys::CHANNEL.into(), channel.into());
        metadata.insert(keys::CHAT_ID.into(), chat_id.into());
        metadata.insert(
            keys::TIMESTAMP.into(),
            at.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        metadata.insert(keys::DATE.into(), at.format("%Y-%m-%d").to_string());

        let document = Document {
            id: doc_id.clone(),
            content,
            metadata,
        };

        match self.conversations.add_document(document).await {
            Ok(()) => {
                metrics::record_conversation_indexed();
                debug!(doc_id = %doc_id, content_len, "indexed conversation turn");
            }
            Err(e) => {
                error!(error = %e, session_key = %session_key, "failed to index conversation");
            }
        }
    }

    /// Insert a global, unattributed fact. Returns the document id.
    pub async fn index_knowledge(
        &self,
        id: Option<&str>,
        fact: &str,
        category: &str,
    ) -> Result<String, RecallError> {
        self.index_knowledge_with_opts(id, fact, category, &KnowledgeIndexOpts::default())
            .await
    }

    /// Insert a fact with optional specialist scope and provenance.
    ///
    /// An absent or empty `id` is replaced by `k:<nanoseconds>`.
    pub async fn index_knowledge_with_opts(
        &self,
        id: Option<&str>,
        fact: &str,
        category: &str,
        opts: &KnowledgeIndexOpts,
    ) -> Result<String, RecallError> {
        let doc_id = match id.filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => self.next_knowledge_id(),
        };

        let mut metadata = Metadata::new();
        metadata.insert(keys::CATEGORY.into(), category.into());
        metadata.insert(
            keys::UPDATED_AT.into(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        opts.apply(&mut metadata);

        self.knowledge
            .add_document(Document {
                id: doc_id.clone(),
                content: fact.to_string(),
                metadata,
            })
            .await?;

        debug!(
            doc_id = %doc_id,
            category = %category,
            specialist = opts.scope().unwrap_or(""),
            fact_len = fact.len(),
            "indexed knowledge"
        );
        Ok(doc_id)
    }

    /// Permanently remove a fact.
    pub async fn delete_knowledge(&self, id: &str) -> Result<(), RecallError> {
        if self.knowledge.delete(id).await? {
            debug!(doc_id = %id, "deleted knowledge");
            Ok(())
        } else {
            Err(RecallError::NotFound {
                kind: KNOWLEDGE.to_string(),
                id: id.to_string(),
            })
        }
    }

    /// Similarity search over conversation turns.
    pub async fn search_conversations(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryResult>, RecallError> {
        query_bounded(
            self.conversations.as_ref(),
            query,
            limit,
            &MetadataFilter::new(),
            MemorySource::Conversation,
        )
        .await
    }

    /// Global similarity search over knowledge.
    pub async fn search_knowledge(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryResult>, RecallError> {
        self.search_knowledge_filtered(query, limit, &MetadataFilter::new())
            .await
    }

    /// Knowledge search restricted to documents whose metadata matches `filter`.
    pub async fn search_knowledge_filtered(
        &self,
        query: &str,
        limit: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<MemoryResult>, RecallError> {
        query_bounded(
            self.knowledge.as_ref(),
            query,
            limit,
            filter,
            MemorySource::Knowledge,
        )
        .await
    }

    /// Knowledge search preferring one specialist's facts, backfilled from
    /// the global pool. An empty specialist is a plain global search.
    pub async fn search_knowledge_scoped(
        &self,
        query: &str,
        limit: usize,
        specialist: &str,
    ) -> Result<Vec<MemoryResult>, RecallError> {
        if specialist.is_empty() {
            return self.search_knowledge(query, limit).await;
        }
        blackboard::search_scoped(self, query, limit, specialist).await
    }

    /// Search one or both collections.
    ///
    /// In `all` mode each collection is asked for `limit` hits, the union is
    /// sorted by score and cut back to `limit`. A failure in one collection
    /// is logged and the other's hits are still returned.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: SearchFilter,
    ) -> Result<Vec<MemoryResult>, RecallError> {
        match filter {
            SearchFilter::Conversations => self.search_conversations(query, limit).await,
            SearchFilter::Knowledge => self.search_knowledge(query, limit).await,
            SearchFilter::All => {
                let (conversations, knowledge) = tokio::join!(
                    self.search_conversations(query, limit),
                    self.search_knowledge(query, limit)
                );

                let mut all = Vec::new();
                match conversations {
                    Ok(hits) => all.extend(hits),
                    Err(e) => warn!(error = %e, "conversation search failed"),
                }
                match knowledge {
                    Ok(hits) => all.extend(hits),
                    Err(e) => warn!(error = %e, "knowledge search failed"),
                }

                all.sort_by(|a, b| b.score.total_cmp(&a.score));
                all.truncate(limit);
                Ok(all)
            }
        }
    }

    /// `k:<unix nanos>`, strictly increasing within this process.
    fn next_knowledge_id(&self) -> String {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let mut last = self.last_knowledge_nanos.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self.last_knowledge_nanos.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return format!("k:{next}"),
                Err(current) => last = current,
            }
        }
    }
}

/// `<workspace>/memory/vectors`
pub fn vectors_dir(workspace: &Path) -> PathBuf {
    workspace.join("memory").join("vectors")
}

/// Query a collection, never asking for more hits than it holds.
async fn query_bounded(
    collection: &dyn Collection,
    query: &str,
    limit: usize,
    filter: &MetadataFilter,
    source: MemorySource,
) -> Result<Vec<MemoryResult>, RecallError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let count = collection.count().await?;
    if count == 0 {
        return Ok(Vec::new());
    }

    let hits = collection.query(query, limit.min(count), filter).await?;
    Ok(hits
        .into_iter()
        .map(|hit| MemoryResult::from_hit(hit, source))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_test_utils::MockEmbedder;

    async fn store_with(embedder: Arc<MockEmbedder>) -> VectorStore {
        VectorStore::in_memory(embedder).await.unwrap()
    }

    #[tokio::test]
    async fn conversation_is_formatted_and_tagged() {
        let store = store_with(Arc::new(MockEmbedder::new())).await;
        let at = DateTime::parse_from_rfc3339("2026-02-03T04:05:06Z")
            .unwrap()
            .with_timezone(&Utc);
        store
            .index_conversation_at("telegram:42", "telegram", "42", "hi there", "hello", at)
            .await;

        let results = store.search_conversations("hi there", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.id, format!("telegram:42:{}", at.timestamp()));
        assert_eq!(r.content, "User: hi there\nAssistant: hello");
        assert_eq!(r.timestamp, "2026-02-03T04:05:06Z");
        assert_eq!(r.channel.as_deref(), Some("telegram"));
        assert_eq!(r.source, MemorySource::Conversation);
    }

    #[tokio::test]
    async fn long_conversation_truncates_on_char_boundary() {
        let store = store_with(Arc::new(MockEmbedder::new())).await;
        let user = "é".repeat(9000);
        store.index_conversation("s", "cli", "1", &user, "ok").await;

        let results = store.search_conversations("x", 1).await.unwrap();
        let content = &results[0].content;
        assert_eq!(content.chars().count(), 8000);
        assert!(content.starts_with("User: é"));
        assert!(content.ends_with('é'));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn conversation_index_failure_is_swallowed() {
        let embedder = Arc::new(MockEmbedder::new());
        embedder.fail_on("boom");
        let store = store_with(embedder).await;
        store.index_conversation("s", "cli", "1", "boom", "x").await;
        assert_eq!(store.conversation_count().await.unwrap(), 0);
        assert!(logs_contain("failed to index conversation"));
    }

    #[tokio::test]
    async fn knowledge_ids_are_generated_and_unique() {
        let store = store_with(Arc::new(MockEmbedder::new())).await;
        let a = store.index_knowledge(None, "fact a", "task").await.unwrap();
        let b = store.index_knowledge(Some(""), "fact b", "task").await.unwrap();
        let c = store
            .index_knowledge(Some("manual-1"), "fact c", "task")
            .await
            .unwrap();

        assert!(a.starts_with("k:"));
        assert!(b.starts_with("k:"));
        assert_ne!(a, b);
        assert_eq!(c, "manual-1");
        assert_eq!(store.knowledge_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn knowledge_carries_scope_and_provenance() {
        let store = store_with(Arc::new(MockEmbedder::new())).await;
        let opts = KnowledgeIndexOpts {
            specialist: Some("finance".into()),
            source_type: Some("email".into()),
            source_person: Some("Sarah".into()),
            ..Default::default()
        };
        store
            .index_knowledge_with_opts(None, "Budget approved", "financial", &opts)
            .await
            .unwrap();

        let results = store.search_knowledge("Budget approved", 1).await.unwrap();
        let r = &results[0];
        assert_eq!(r.category.as_deref(), Some("financial"));
        assert_eq!(r.specialist.as_deref(), Some("finance"));
        assert_eq!(r.source_type.as_deref(), Some("email"));
        assert_eq!(r.source_person.as_deref(), Some("Sarah"));
        assert!(!r.timestamp.is_empty());
    }

    #[tokio::test]
    async fn delete_missing_knowledge_is_not_found() {
        let store = store_with(Arc::new(MockEmbedder::new())).await;
        let err = store.delete_knowledge("k:missing").await.unwrap_err();
        assert!(matches!(err, RecallError::NotFound { .. }));
    }

    #[tokio::test]
    async fn limit_is_bounded_by_collection_size() {
        let store = store_with(Arc::new(MockEmbedder::new())).await;
        store.index_knowledge(None, "one", "task").await.unwrap();
        store.index_knowledge(None, "two", "task").await.unwrap();

        assert_eq!(store.search_knowledge("one", 50).await.unwrap().len(), 2);
        assert!(store.search_knowledge("one", 0).await.unwrap().is_empty());
        assert!(store.search_conversations("one", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn merged_search_sorts_and_truncates() {
        let embedder = Arc::new(MockEmbedder::new());
        let q = [1.0, 0.0];
        embedder.pin("where do I live", q.to_vec());
        embedder.pin_similarity("User: conv high\nAssistant: ok", &q, 0.9);
        embedder.pin_similarity("User: conv low\nAssistant: ok", &q, 0.5);
        embedder.pin_similarity("know top", &q, 0.95);
        embedder.pin_similarity("know mid", &q, 0.85);
        embedder.pin_similarity("know low", &q, 0.3);
        let store = store_with(embedder).await;

        store.index_conversation("a", "cli", "1", "conv high", "ok").await;
        store.index_conversation("b", "cli", "1", "conv low", "ok").await;
        for fact in ["know top", "know mid", "know low"] {
            store.index_knowledge(None, fact, "contextual").await.unwrap();
        }

        let results = store
            .search("where do I live", 3, SearchFilter::All)
            .await
            .unwrap();
        let scores: Vec<f32> = results.iter().map(|r| (r.score * 100.0).round() / 100.0).collect();
        assert_eq!(scores, vec![0.95, 0.9, 0.85]);
        assert_eq!(results[1].source, MemorySource::Conversation);
    }

    #[test]
    fn search_filter_parses_known_values() {
        assert_eq!("".parse::<SearchFilter>().unwrap(), SearchFilter::All);
        assert_eq!("all".parse::<SearchFilter>().unwrap(), SearchFilter::All);
        assert_eq!(
            "knowledge".parse::<SearchFilter>().unwrap(),
            SearchFilter::Knowledge
        );
        assert!(matches!(
            "facts".parse::<SearchFilter>(),
            Err(RecallError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn open_creates_vectors_directory() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(MockEmbedder::new());
        let store = VectorStore::open(dir.path(), embedder).await.unwrap();
        store.index_knowledge(None, "persisted", "task").await.unwrap();
        assert!(dir.path().join("memory/vectors/memory.db").exists());
    }
}
