// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `recall backfill` command implementation.

use std::path::Path;

use recall_core::RecallError;
use recall_memory::{BackfillOptions, BackfillStats, MemoryEngine};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Backfill `sessions_dir`, stopping cleanly on Ctrl-C.
pub async fn run_backfill(
    engine: &MemoryEngine,
    sessions_dir: &Path,
    extract: bool,
    dry_run: bool,
) -> Result<(), RecallError> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping backfill");
                cancel.cancel();
            }
        })
    };

    let result = backfill_with(engine, sessions_dir, extract, dry_run, &cancel).await;
    watcher.abort();

    match result {
        Ok(stats) => {
            println!("{}", render_stats(&stats, dry_run));
            Ok(())
        }
        Err((stats, e)) => {
            println!("{}", render_stats(&stats, dry_run));
            Err(e)
        }
    }
}

async fn backfill_with(
    engine: &MemoryEngine,
    sessions_dir: &Path,
    extract: bool,
    dry_run: bool,
    cancel: &CancellationToken,
) -> Result<BackfillStats, (BackfillStats, RecallError)> {
    let opts = BackfillOptions {
        extract_knowledge: extract,
        dry_run,
        ..BackfillOptions::default()
    };
    engine.backfill(sessions_dir, &opts, cancel).await
}

fn render_stats(stats: &BackfillStats, dry_run: bool) -> String {
    let prefix = if dry_run { "[dry run] " } else { "" };
    format!(
        "{prefix}sessions: {}/{} processed, turns indexed: {}, facts extracted: {}, errors: {}",
        stats.sessions_processed,
        stats.sessions_total,
        stats.turns_indexed,
        stats.facts_extracted,
        stats.errors
    )
}
