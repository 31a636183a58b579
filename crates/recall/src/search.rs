// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `recall search` and `recall relations` command implementations.

use recall_core::RecallError;
use recall_memory::{MemoryEngine, SearchFilter, format_results};

/// Run a memory search and render the results.
///
/// With a specialist the scoped blackboard search is used and `filter` is
/// ignored, since only knowledge carries a scope.
pub async fn run_search(
    engine: &MemoryEngine,
    query: &str,
    limit: usize,
    filter: SearchFilter,
    specialist: Option<&str>,
) -> Result<String, RecallError> {
    if query.trim().is_empty() {
        return Err(RecallError::InvalidArgument("query must not be empty".into()));
    }
    let results = match specialist.filter(|s| !s.is_empty()) {
        Some(specialist) => engine.search_scoped(query, limit, specialist).await?,
        None => engine.search(query, limit, filter).await?,
    };
    Ok(format_results(&results))
}

/// Render the relations mentioning `entity`.
pub async fn run_relations(engine: &MemoryEngine, entity: &str, specialist: &str) -> String {
    let described = engine.describe_relations(entity, specialist).await;
    if described.is_empty() {
        format!("No relations found for {entity}.")
    } else {
        described
    }
}
