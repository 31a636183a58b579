// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only entity relation log.
//!
//! Relations live in memory and in `<workspace>/memory/relations.jsonl`, one
//! JSON object per line. The file is read once on open; every new relation
//! is appended to both.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use recall_core::error::RecallError;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::types::Relation;

/// File name of the relation log inside `<workspace>/memory/`.
pub const RELATIONS_FILE: &str = "relations.jsonl";

/// In-memory relation set backed by a JSONL log.
pub struct RelationStore {
    path: PathBuf,
    relations: RwLock<Vec<Relation>>,
}

impl RelationStore {
    /// Open the log under `<workspace>/memory/`.
    pub async fn open_in_workspace(workspace: &Path) -> Result<Self, RecallError> {
        Self::open(workspace.join("memory").join(RELATIONS_FILE)).await
    }

    /// Open (or create on first write) the log at `path`.
    ///
    /// Lines that fail to parse are skipped with a warning.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RecallError> {
        let path = path.into();
        let mut relations = Vec::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                for (line_no, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Relation>(line) {
                        Ok(relation) => relations.push(relation),
                        Err(e) => warn!(
                            path = %path.display(),
                            line = line_no + 1,
                            error = %e,
                            "skipping malformed relation"
                        ),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(RecallError::storage(e)),
        }

        info!(path = %path.display(), count = relations.len(), "relation store loaded");
        Ok(Self {
            path,
            relations: RwLock::new(relations),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add a relation unless an equivalent triple is already stored.
    ///
    /// Triples compare case-insensitively after trimming. Returns whether
    /// the relation was new.
    pub async fn add(&self, mut relation: Relation) -> Result<bool, RecallError> {
        let mut relations = self.relations.write().await;

        if relations.iter().any(|existing| same_triple(existing, &relation)) {
            debug!(
                subject = %relation.subject,
                predicate = %relation.predicate,
                object = %relation.object,
                "relation already known"
            );
            return Ok(false);
        }

        if relation.timestamp.is_empty() {
            relation.timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        }

        let mut line = serde_json::to_string(&relation).map_err(RecallError::storage)?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(RecallError::storage)?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(RecallError::storage)?;
        file.write_all(line.as_bytes())
            .await
            .map_err(RecallError::storage)?;
        file.flush().await.map_err(RecallError::storage)?;

        debug!(
            subject = %relation.subject,
            predicate = %relation.predicate,
            object = %relation.object,
            specialist = %relation.specialist,
            "relation added"
        );
        relations.push(relation);
        metrics::record_relation_added();
        Ok(true)
    }

    /// Every relation mentioning `entity` as subject or object.
    pub async fn query(&self, entity: &str) -> Vec<Relation> {
        self.query_scoped(entity, "").await
    }

    /// Like [`query`](Self::query), restricted to global relations and those
    /// in `specialist`'s scope. An empty `specialist` sees everything.
    pub async fn query_scoped(&self, entity: &str, specialist: &str) -> Vec<Relation> {
        let needle = normalize(entity);
        let relations = self.relations.read().await;
        relations
            .iter()
            .filter(|r| {
                specialist.is_empty() || r.specialist.is_empty() || r.specialist == specialist
            })
            .filter(|r| normalize(&r.subject) == needle || normalize(&r.object) == needle)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.relations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.relations.read().await.is_empty()
    }
}

/// Render one `subject → predicate → object` line per relation.
pub fn format_relations(relations: &[Relation]) -> String {
    relations
        .iter()
        .map(|r| format!("{} → {} → {}", r.subject, r.predicate, r.object))
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn same_triple(a: &Relation, b: &Relation) -> bool {
    normalize(&a.subject) == normalize(&b.subject)
        && normalize(&a.predicate) == normalize(&b.predicate)
        && normalize(&a.object) == normalize(&b.object)
}
