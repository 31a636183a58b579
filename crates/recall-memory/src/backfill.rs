// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bulk indexing of stored chat sessions.
//!
//! Reads a directory of session JSON files, pairs every user message with
//! the assistant reply that follows it, and indexes each pair as a
//! conversation turn. Knowledge extraction per turn is optional because it
//! costs one or more LLM calls.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use recall_core::error::RecallError;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::extractor::KnowledgeExtractor;
use crate::store::VectorStore;
use crate::types::{KnowledgeIndexOpts, truncate_runes};

/// A stored chat session.
#[derive(Debug, Clone, Deserialize)]
pub struct BackfillSession {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// Progress counters for a backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillStats {
    /// Session files found, excluding system sessions.
    pub sessions_total: usize,
    pub sessions_processed: usize,
    pub turns_indexed: usize,
    /// Turns sent through knowledge extraction.
    pub facts_extracted: usize,
    pub errors: usize,
}

#[derive(Debug, Clone)]
pub struct BackfillOptions {
    /// Also run extraction and consolidation per turn.
    pub extract_knowledge: bool,
    /// Count what would be indexed without writing anything.
    pub dry_run: bool,
    /// Delay between indexed turns.
    pub pace: Duration,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            extract_knowledge: false,
            dry_run: false,
            pace: Duration::from_millis(100),
        }
    }
}

/// Backfill every session under `sessions_dir`.
///
/// Sessions that cannot be read or parsed are counted in `errors` and
/// skipped. Cancellation is observed between sessions and between turns;
/// the stats gathered so far are returned alongside [`RecallError::Cancelled`].
pub async fn backfill(
    sessions_dir: &Path,
    store: &VectorStore,
    extractor: Option<&KnowledgeExtractor>,
    opts: &BackfillOptions,
    cancel: &CancellationToken,
) -> Result<BackfillStats, (BackfillStats, RecallError)> {
    let mut stats = BackfillStats::default();

    let files = match session_files(sessions_dir).await {
        Ok(files) => files,
        Err(e) => return Err((stats, e)),
    };
    stats.sessions_total = files.len();
    info!(dir = %sessions_dir.display(), sessions = stats.sessions_total, "starting backfill");

    for path in files {
        if cancel.is_cancelled() {
            return Err((stats, RecallError::Cancelled));
        }

        let result = backfill_session(&path, store, extractor, opts, cancel, &mut stats).await;
        match result {
            Ok(()) => {}
            Err(RecallError::Cancelled) => return Err((stats, RecallError::Cancelled)),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "failed to backfill session");
                stats.errors += 1;
            }
        }
        stats.sessions_processed += 1;

        info!(
            processed = stats.sessions_processed,
            total = stats.sessions_total,
            file = %path.display(),
            turns_indexed = stats.turns_indexed,
            "session backfilled"
        );
    }

    Ok(stats)
}

/// `*.json` files in `dir`, sorted by name, with system sessions removed.
async fn session_files(dir: &Path) -> Result<Vec<PathBuf>, RecallError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(RecallError::storage)?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(RecallError::storage)? {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if !is_file || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_system_session(&name) {
            debug!(file = %name, "skipping system session");
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

fn is_system_session(file_name: &str) -> bool {
    file_name.starts_with("heartbeat") || file_name.starts_with("cron-")
}

async fn backfill_session(
    path: &Path,
    store: &VectorStore,
    extractor: Option<&KnowledgeExtractor>,
    opts: &BackfillOptions,
    cancel: &CancellationToken,
    stats: &mut BackfillStats,
) -> Result<(), RecallError> {
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(RecallError::storage)?;
    let session: BackfillSession = serde_json::from_str(&data).map_err(|e| RecallError::Parse {
        message: format!("session {}: {e}", path.display()),
    })?;

    let (channel, chat_id) = parse_session_key(&session.key);
    let base_time = session.created.unwrap_or_else(Utc::now);

    for (turn, (user_msg, assistant_msg)) in pair_turns(&session.messages).into_iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(RecallError::Cancelled);
        }

        if opts.dry_run {
            debug!(session_key = %session.key, preview = %truncate_runes(user_msg, 80), "dry run: would index turn");
            stats.turns_indexed += 1;
            continue;
        }

        // Distinct per-turn timestamps keep conversation ids unique.
        let at = base_time + chrono::Duration::seconds(turn as i64);
        store
            .index_conversation_at(&session.key, channel, chat_id, user_msg, assistant_msg, at)
            .await;
        stats.turns_indexed += 1;

        if opts.extract_knowledge
            && let Some(extractor) = extractor
        {
            extractor
                .extract_and_consolidate(
                    user_msg,
                    assistant_msg,
                    &session.key,
                    "",
                    &KnowledgeIndexOpts::default(),
                )
                .await;
            stats.facts_extracted += 1;
        }

        if !opts.pace.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(RecallError::Cancelled),
                _ = tokio::time::sleep(opts.pace) => {}
            }
        }
    }

    Ok(())
}

/// Pair each non-empty user message with the next non-empty assistant
/// message, stopping at the next user message.
pub fn pair_turns(messages: &[SessionMessage]) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    for (i, msg) in messages.iter().enumerate() {
        if msg.role != "user" || msg.content.is_empty() {
            continue;
        }
        let reply = messages[i + 1..]
            .iter()
            .take_while(|m| m.role != "user")
            .find(|m| m.role == "assistant" && !m.content.is_empty());
        if let Some(reply) = reply {
            pairs.push((msg.content.as_str(), reply.content.as_str()));
        }
    }
    pairs
}

/// Split `channel:chat_id`. Keys without a colon map to `("unknown", key)`.
pub fn parse_session_key(key: &str) -> (&str, &str) {
    key.split_once(':').unwrap_or(("unknown", key))
}
