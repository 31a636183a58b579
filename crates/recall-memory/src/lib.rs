// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic memory for conversational agents.
//!
//! Two embedding-indexed collections back the engine: `conversations` holds
//! raw turns and `knowledge` holds short facts distilled from them. Facts
//! are consolidated against their nearest neighbours before they are
//! written, so the knowledge base updates instead of piling up duplicates.
//!
//! ## Architecture
//!
//! - **VectorStore**: the two collections over SQLite, with merged search
//! - **KnowledgeExtractor**: LLM fact extraction and ADD/UPDATE/DELETE/NOOP consolidation
//! - **RelationStore**: entity triples in an append-only JSONL log
//! - **blackboard**: specialist-scoped knowledge search with global backfill
//! - **MemoryWorker**: bounded background queue for post-turn writes
//! - **backfill**: bulk indexing of stored chat sessions
//! - **MemoryEngine**: everything above, wired from configuration

pub mod backfill;
pub mod blackboard;
pub mod chunk;
pub mod collection;
pub mod decode;
pub mod engine;
pub mod extractor;
pub mod format;
pub mod metrics;
pub mod relations;
pub mod store;
pub mod types;
pub mod worker;

pub use backfill::{BackfillOptions, BackfillStats};
pub use collection::{Collection, SqliteCollection};
pub use engine::MemoryEngine;
pub use extractor::{
    ConsolidationAction, ConsolidationOutcome, ExtractorSettings, IngestReport, KnowledgeExtractor,
};
pub use format::format_results;
pub use relations::{RelationStore, format_relations};
pub use store::{SearchFilter, VectorStore};
pub use types::*;
pub use worker::{MemoryJob, MemoryWorker, TurnRecord};
