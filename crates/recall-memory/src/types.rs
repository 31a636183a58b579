// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types shared by the store, extractor, and formatter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Document metadata: flat string key/value pairs.
pub type Metadata = BTreeMap<String, String>;

/// Equality filter over metadata; every entry must match.
pub type MetadataFilter = BTreeMap<String, String>;

/// Metadata keys written by the store.
pub mod keys {
    pub const SESSION_KEY: &str = "session_key";
    pub const CHANNEL: &str = "channel";
    pub const CHAT_ID: &str = "chat_id";
    pub const TIMESTAMP: &str = "timestamp";
    pub const DATE: &str = "date";
    pub const CATEGORY: &str = "category";
    pub const UPDATED_AT: &str = "updated_at";
    pub const SPECIALIST: &str = "specialist";
    pub const SOURCE_TYPE: &str = "source_type";
    pub const SOURCE_NAME: &str = "source_name";
    pub const SOURCE_DATE: &str = "source_date";
    pub const SOURCE_PERSON: &str = "source_person";
}

/// A document to be written into a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
}

/// A nearest-neighbour hit returned by a collection query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    /// Cosine similarity in `[-1, 1]`.
    pub similarity: f32,
}

/// Which collection a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    Conversation,
    Knowledge,
}

impl MemorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemorySource::Conversation => "conversation",
            MemorySource::Knowledge => "knowledge",
        }
    }
}

/// The uniform shape returned by every search operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryResult {
    pub id: String,
    pub content: String,
    pub score: f32,
    /// RFC3339 turn time for conversations, `updated_at` for knowledge.
    pub timestamp: String,
    pub source: MemorySource,
    pub category: Option<String>,
    pub channel: Option<String>,
    pub specialist: Option<String>,
    pub source_type: Option<String>,
    pub source_name: Option<String>,
    pub source_date: Option<String>,
    pub source_person: Option<String>,
}

impl MemoryResult {
    /// Build a result from a raw hit, lifting the known metadata keys.
    pub fn from_hit(hit: QueryHit, source: MemorySource) -> Self {
        let QueryHit {
            id,
            content,
            mut metadata,
            similarity,
        } = hit;
        let mut take = |key: &str| metadata.remove(key).filter(|v| !v.is_empty());

        let timestamp = match source {
            MemorySource::Conversation => take(keys::TIMESTAMP),
            MemorySource::Knowledge => take(keys::UPDATED_AT),
        }
        .unwrap_or_default();

        Self {
            id,
            content,
            score: similarity,
            timestamp,
            source,
            category: take(keys::CATEGORY),
            channel: take(keys::CHANNEL),
            specialist: take(keys::SPECIALIST),
            source_type: take(keys::SOURCE_TYPE),
            source_name: take(keys::SOURCE_NAME),
            source_date: take(keys::SOURCE_DATE),
            source_person: take(keys::SOURCE_PERSON),
        }
    }
}

/// Optional scope and provenance attached to a knowledge fact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeIndexOpts {
    /// Specialist scope; `None` means global.
    pub specialist: Option<String>,
    /// Kind of origin, e.g. `conversation`, `email`, `document`.
    pub source_type: Option<String>,
    /// Name of the originating document or thread.
    pub source_name: Option<String>,
    /// When the source was produced.
    pub source_date: Option<String>,
    /// Who provided the information.
    pub source_person: Option<String>,
}

impl KnowledgeIndexOpts {
    /// Options scoped to a specialist with no provenance.
    pub fn scoped(specialist: impl Into<String>) -> Self {
        Self {
            specialist: Some(specialist.into()),
            ..Self::default()
        }
    }

    /// The specialist scope, treating an empty string as global.
    pub fn scope(&self) -> Option<&str> {
        self.specialist.as_deref().filter(|s| !s.is_empty())
    }

    /// Copy the non-empty fields into document metadata.
    pub(crate) fn apply(&self, metadata: &mut Metadata) {
        let fields = [
            (keys::SPECIALIST, &self.specialist),
            (keys::SOURCE_TYPE, &self.source_type),
            (keys::SOURCE_NAME, &self.source_name),
            (keys::SOURCE_DATE, &self.source_date),
            (keys::SOURCE_PERSON, &self.source_person),
        ];
        for (key, value) in fields {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                metadata.insert(key.to_string(), value.to_string());
            }
        }
    }
}

/// A fact extracted from text by the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub fact: String,
    #[serde(default)]
    pub category: String,
}

/// A subject/predicate/object triple linking two entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    #[serde(rename = "s")]
    pub subject: String,
    #[serde(rename = "p")]
    pub predicate: String,
    #[serde(rename = "o")]
    pub object: String,
    /// RFC3339 creation time; filled on insert when empty.
    #[serde(rename = "ts", default)]
    pub timestamp: String,
    /// Specialist scope; empty means global.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub specialist: String,
}

impl Relation {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            timestamp: String::new(),
            specialist: String::new(),
        }
    }

    /// Attach a specialist scope.
    pub fn scoped(mut self, specialist: impl Into<String>) -> Self {
        self.specialist = specialist.into();
        self
    }
}

/// Convert f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert SQLite BLOB back to f32 vector. Trailing partial bytes are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors.
///
/// Does not assume normalized input. Mismatched lengths or a zero vector
/// yield `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_runes(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
