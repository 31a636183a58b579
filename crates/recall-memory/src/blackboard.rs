// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Specialist-scoped retrieval over the shared knowledge pool.
//!
//! A specialist sees its own facts first. Any shortfall against the
//! requested limit is filled from the whole knowledge collection, so shared
//! facts act as a blackboard every specialist can read. The merged list keeps
//! scoped-then-global order and is never re-sorted by score.

use std::collections::HashSet;

use recall_core::error::RecallError;
use tracing::{debug, warn};

use crate::store::VectorStore;
use crate::types::{MemoryResult, MetadataFilter, keys};

pub(crate) async fn search_scoped(
    store: &VectorStore,
    query: &str,
    limit: usize,
    specialist: &str,
) -> Result<Vec<MemoryResult>, RecallError> {
    let mut filter = MetadataFilter::new();
    filter.insert(keys::SPECIALIST.to_string(), specialist.to_string());

    let scoped = store.search_knowledge_filtered(query, limit, &filter).await?;
    if scoped.len() >= limit {
        return Ok(scoped);
    }

    // The unfiltered pool also contains the scoped hits; over-fetch by that
    // many so deduplication cannot leave a gap.
    let remaining = limit - scoped.len();
    let global = match store.search_knowledge(query, remaining + scoped.len()).await {
        Ok(global) => global,
        Err(e) => {
            warn!(error = %e, specialist = %specialist, "global backfill failed");
            return Ok(scoped);
        }
    };

    let merged = merge_scoped(scoped, global, limit);
    debug!(specialist = %specialist, count = merged.len(), "scoped knowledge search");
    Ok(merged)
}

/// Concatenate scoped hits and global backfill, dropping global hits whose
/// id was already seen, and stop at `limit`.
pub fn merge_scoped(
    scoped: Vec<MemoryResult>,
    global: Vec<MemoryResult>,
    limit: usize,
) -> Vec<MemoryResult> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(limit);

    for result in scoped.into_iter().chain(global) {
        if merged.len() == limit {
            break;
        }
        if seen.insert(result.id.clone()) {
            merged.push(result);
        }
    }

    merged
}
