// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named vector collections backed by SQLite.
//!
//! Embeddings are stored as little-endian f32 BLOBs next to the document text
//! and a JSON metadata object. Similarity queries are a full cosine scan of
//! the collection, run on tokio-rusqlite's background thread.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use recall_core::error::RecallError;
use recall_core::traits::EmbeddingAdapter;
use recall_core::types::EmbeddingInput;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::types::{
    Document, Metadata, MetadataFilter, QueryHit, blob_to_vec, cosine_similarity, vec_to_blob,
};

/// Helper to convert tokio_rusqlite errors into RecallError::Storage.
pub(crate) fn storage_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> RecallError {
    RecallError::Storage {
        source: Box::new(e),
    }
}

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Run all pending schema migrations against the given connection.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), RecallError> {
    embedded::migrations::runner()
        .run(conn)
        .map_err(|e| RecallError::Storage {
            source: e.to_string().into(),
        })?;
    Ok(())
}

/// Open (or create) the collection database at `path` and migrate it.
pub async fn open_database(path: &Path) -> Result<Connection, RecallError> {
    let conn = Connection::open(path)
        .await
        .map_err(|e| storage_err(tokio_rusqlite::Error::Error(e)))?;
    prepare(&conn).await?;
    debug!(path = %path.display(), "vector database opened");
    Ok(conn)
}

/// In-memory collection database, used for isolated stores in tests and dry runs.
pub async fn open_in_memory() -> Result<Connection, RecallError> {
    let conn = Connection::open_in_memory()
        .await
        .map_err(|e| storage_err(tokio_rusqlite::Error::Error(e)))?;
    prepare(&conn).await?;
    Ok(conn)
}

async fn prepare(conn: &Connection) -> Result<(), RecallError> {
    conn.call(|conn| -> Result<Result<(), RecallError>, rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(run_migrations(conn))
    })
    .await
    .map_err(storage_err)?
}

/// The contract the memory store needs from a vector collection.
///
/// Implementations are durable and safe for concurrent use.
#[async_trait]
pub trait Collection: Send + Sync {
    /// The collection name, e.g. `knowledge`.
    fn name(&self) -> &str;

    /// Embed and store a document, replacing any document with the same id.
    async fn add_document(&self, document: Document) -> Result<(), RecallError>;

    /// Up to `limit` most similar documents whose metadata matches `filter`,
    /// ordered by descending similarity.
    async fn query(
        &self,
        text: &str,
        limit: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<QueryHit>, RecallError>;

    /// Remove a document. Returns whether anything was removed.
    async fn delete(&self, id: &str) -> Result<bool, RecallError>;

    /// Number of documents currently stored.
    async fn count(&self) -> Result<usize, RecallError>;
}

/// A named collection inside a shared SQLite database.
pub struct SqliteCollection {
    name: String,
    conn: Connection,
    embedder: Arc<dyn EmbeddingAdapter>,
}

impl SqliteCollection {
    /// Wrap an already-migrated connection.
    pub fn new(
        name: impl Into<String>,
        conn: Connection,
        embedder: Arc<dyn EmbeddingAdapter>,
    ) -> Self {
        Self {
            name: name.into(),
            conn,
            embedder,
        }
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, RecallError> {
        let output = self.embedder.embed(EmbeddingInput::single(text)).await?;
        output
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RecallError::Embedding {
                message: format!("{} returned no embedding", self.embedder.name()),
                source: None,
            })
    }
}

#[async_trait]
impl Collection for SqliteCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add_document(&self, document: Document) -> Result<(), RecallError> {
        let embedding = self.embed_one(&document.content).await?;
        let blob = vec_to_blob(&embedding);
        let metadata = serde_json::to_string(&document.metadata).map_err(|e| {
            RecallError::Internal(format!("failed to encode metadata: {e}"))
        })?;
        let collection = self.name.clone();
        let Document { id, content, .. } = document;
        let doc_id = id.clone();

        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO documents (collection, id, content, embedding, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(collection, id) DO UPDATE SET
                         content = excluded.content,
                         embedding = excluded.embedding,
                         metadata = excluded.metadata",
                    rusqlite::params![collection, id, content, blob, metadata],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)?;

        debug!(collection = %self.name, id = %doc_id, "document stored");
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        limit: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<QueryHit>, RecallError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self.embed_one(text).await?;
        let collection = self.name.clone();
        let filter = filter.clone();

        self.conn
            .call(move |conn| -> Result<Vec<QueryHit>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, content, embedding, metadata FROM documents WHERE collection = ?1",
                )?;
                let rows = stmt.query_map(rusqlite::params![collection], |row| {
                    let id: String = row.get(0)?;
                    let content: String = row.get(1)?;
                    let blob: Vec<u8> = row.get(2)?;
                    let metadata: String = row.get(3)?;
                    Ok((id, content, blob, metadata))
                })?;

                let mut hits = Vec::new();
                for row in rows {
                    let (id, content, blob, metadata) = row?;
                    let metadata: Metadata = serde_json::from_str(&metadata).unwrap_or_default();
                    if !matches_filter(&metadata, &filter) {
                        continue;
                    }
                    let similarity = cosine_similarity(&query_vec, &blob_to_vec(&blob));
                    hits.push(QueryHit {
                        id,
                        content,
                        metadata,
                        similarity,
                    });
                }

                hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
                hits.truncate(limit);
                Ok(hits)
            })
            .await
            .map_err(storage_err)
    }

    async fn delete(&self, id: &str) -> Result<bool, RecallError> {
        let collection = self.name.clone();
        let id = id.to_string();
        let removed = self
            .conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                    rusqlite::params![collection, id],
                )
            })
            .await
            .map_err(storage_err)?;
        Ok(removed > 0)
    }

    async fn count(&self) -> Result<usize, RecallError> {
        let collection = self.name.clone();
        let count = self
            .conn
            .call(move |conn| -> Result<i64, rusqlite::Error> {
                conn.query_row(
                    "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                    rusqlite::params![collection],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(storage_err)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn matches_filter(metadata: &Metadata, filter: &MetadataFilter) -> bool {
    filter
        .iter()
        .all(|(key, value)| metadata.get(key) == Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_test_utils::MockEmbedder;

    async fn collection(name: &str, embedder: Arc<MockEmbedder>) -> SqliteCollection {
        let conn = open_in_memory().await.unwrap();
        SqliteCollection::new(name, conn, embedder)
    }

    fn doc(id: &str, content: &str, meta: &[(&str, &str)]) -> Document {
        Document {
            id: id.to_string(),
            content: content.to_string(),
            metadata: meta
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn query_orders_by_similarity() {
        let embedder = Arc::new(MockEmbedder::new());
        embedder.pin("q", vec![1.0, 0.0]);
        embedder.pin_similarity("close", &[1.0, 0.0], 0.9);
        embedder.pin_similarity("far", &[1.0, 0.0], 0.2);
        let coll = collection("knowledge", embedder).await;

        coll.add_document(doc("a", "far", &[])).await.unwrap();
        coll.add_document(doc("b", "close", &[])).await.unwrap();

        let hits = coll.query("q", 10, &MetadataFilter::new()).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "b");
        assert!((hits[0].similarity - 0.9).abs() < 1e-4);
        assert!((hits[1].similarity - 0.2).abs() < 1e-4);
    }

    #[tokio::test]
    async fn add_document_upserts_by_id() {
        let embedder = Arc::new(MockEmbedder::new());
        let coll = collection("knowledge", embedder).await;

        coll.add_document(doc("k:1", "first", &[])).await.unwrap();
        coll.add_document(doc("k:1", "second", &[])).await.unwrap();

        assert_eq!(coll.count().await.unwrap(), 1);
        let hits = coll.query("second", 1, &MetadataFilter::new()).await.unwrap();
        assert_eq!(hits[0].content, "second");
    }

    #[tokio::test]
    async fn filter_requires_every_entry() {
        let embedder = Arc::new(MockEmbedder::new());
        let coll = collection("knowledge", embedder).await;
        coll.add_document(doc("a", "alpha", &[("specialist", "finance")]))
            .await
            .unwrap();
        coll.add_document(doc("b", "beta", &[("specialist", "legal")]))
            .await
            .unwrap();
        coll.add_document(doc("c", "gamma", &[])).await.unwrap();

        let mut filter = MetadataFilter::new();
        filter.insert("specialist".into(), "finance".into());
        let hits = coll.query("alpha", 10, &filter).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].metadata["specialist"], "finance");
    }

    #[tokio::test]
    async fn collections_share_a_database_without_mixing() {
        let embedder = Arc::new(MockEmbedder::new());
        let conn = open_in_memory().await.unwrap();
        let convs = SqliteCollection::new("conversations", conn.clone(), embedder.clone());
        let know = SqliteCollection::new("knowledge", conn, embedder);

        convs.add_document(doc("x", "turn", &[])).await.unwrap();
        know.add_document(doc("x", "fact", &[])).await.unwrap();
        know.add_document(doc("y", "fact two", &[])).await.unwrap();

        assert_eq!(convs.count().await.unwrap(), 1);
        assert_eq!(know.count().await.unwrap(), 2);
        assert!(know.delete("x").await.unwrap());
        assert_eq!(convs.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_missing_reports_false() {
        let coll = collection("knowledge", Arc::new(MockEmbedder::new())).await;
        assert!(!coll.delete("nope").await.unwrap());
    }

    #[tokio::test]
    async fn zero_limit_skips_embedding() {
        let embedder = Arc::new(MockEmbedder::new());
        let coll = collection("knowledge", embedder.clone()).await;
        let hits = coll.query("anything", 0, &MetadataFilter::new()).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(embedder.call_count(), 0);
    }

    #[tokio::test]
    async fn database_file_persists_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        let embedder = Arc::new(MockEmbedder::new());

        {
            let conn = open_database(&path).await.unwrap();
            let coll = SqliteCollection::new("knowledge", conn, embedder.clone());
            coll.add_document(doc("k:1", "persisted", &[])).await.unwrap();
        }

        let conn = open_database(&path).await.unwrap();
        let coll = SqliteCollection::new("knowledge", conn, embedder);
        assert_eq!(coll.count().await.unwrap(), 1);
    }
}
