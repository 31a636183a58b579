// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `recall feed` command implementation.
//!
//! Reads a document, extracts facts window by window, and consolidates them
//! into a specialist's scoped knowledge with source attribution.

use std::path::PathBuf;

use recall_core::RecallError;
use recall_memory::{ConsolidationOutcome, IngestReport, KnowledgeIndexOpts, MemoryEngine};
use tracing::info;

/// Arguments of one `recall feed` invocation.
#[derive(Debug, Clone)]
pub struct FeedRequest {
    pub file: PathBuf,
    pub specialist: String,
    pub source_type: String,
    pub source_name: Option<String>,
    pub source_date: Option<String>,
    pub source_person: Option<String>,
    pub category: String,
}

impl FeedRequest {
    fn index_opts(&self) -> KnowledgeIndexOpts {
        let source_name = self.source_name.clone().or_else(|| {
            self.file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        });
        KnowledgeIndexOpts {
            specialist: Some(self.specialist.clone()),
            source_type: Some(self.source_type.clone()),
            source_name,
            source_date: self.source_date.clone(),
            source_person: self.source_person.clone(),
        }
    }
}

/// Ingest the requested file and return a one-line summary.
pub async fn run_feed(engine: &MemoryEngine, request: FeedRequest) -> Result<String, RecallError> {
    if request.specialist.trim().is_empty() {
        return Err(RecallError::InvalidArgument(
            "--specialist must not be empty".into(),
        ));
    }

    let content = tokio::fs::read_to_string(&request.file)
        .await
        .map_err(|e| {
            RecallError::InvalidArgument(format!("cannot read {}: {e}", request.file.display()))
        })?;
    if content.trim().is_empty() {
        return Err(RecallError::InvalidArgument(format!(
            "{} is empty",
            request.file.display()
        )));
    }

    let opts = request.index_opts();
    let report = engine.ingest(&content, &request.category, &opts).await?;
    info!(
        specialist = %request.specialist,
        file = %request.file.display(),
        facts = report.facts_extracted,
        "feed completed"
    );
    Ok(summarize(&request.specialist, &report))
}

fn summarize(specialist: &str, report: &IngestReport) -> String {
    let (mut added, mut updated, mut deleted, mut unchanged) = (0, 0, 0, 0);
    for outcome in &report.outcomes {
        match outcome {
            ConsolidationOutcome::Added { .. } => added += 1,
            ConsolidationOutcome::Updated { .. } => updated += 1,
            ConsolidationOutcome::Deleted { .. } => deleted += 1,
            ConsolidationOutcome::Unchanged => unchanged += 1,
        }
    }

    let mut line = format!(
        "Fed {specialist}: {} facts from {} windows ({added} added, {updated} updated, {deleted} deleted, {unchanged} unchanged)",
        report.facts_extracted, report.windows
    );
    if report.failed_windows > 0 {
        line.push_str(&format!(", {} windows failed", report.failed_windows));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_memory::SearchFilter;
    use recall_test_utils::TestHarness;

    fn request(file: PathBuf) -> FeedRequest {
        FeedRequest {
            file,
            specialist: "events".into(),
            source_type: "whatsapp_chat".into(),
            source_name: None,
            source_date: Some("2025-11-06".into()),
            source_person: Some("Charlie".into()),
            category: "contextual".into(),
        }
    }

    #[tokio::test]
    async fn feeds_file_into_specialist_scope() {
        let harness = TestHarness::builder()
            .with_mock_responses(vec![
                r#"[{"fact":"Charlie booked The Grand Hall for June 15th","category":"logistic"}]"#
                    .to_string(),
            ])
            .build()
            .await
            .unwrap();

        let path = harness.workspace().join("charlie.txt");
        tokio::fs::write(&path, "Charlie: booked The Grand Hall for June 15th.")
            .await
            .unwrap();

        let summary = run_feed(&harness.engine, request(path)).await.unwrap();
        assert_eq!(
            summary,
            "Fed events: 1 facts from 1 windows (1 added, 0 updated, 0 deleted, 0 unchanged)"
        );

        let results = harness
            .engine
            .search("Grand Hall", 5, SearchFilter::Knowledge)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].specialist.as_deref(), Some("events"));
        assert_eq!(results[0].source_name.as_deref(), Some("charlie.txt"));
        assert_eq!(results[0].source_person.as_deref(), Some("Charlie"));
    }

    #[tokio::test]
    async fn missing_file_is_invalid_argument() {
        let harness = TestHarness::builder().build().await.unwrap();
        let path = harness.workspace().join("absent.txt");
        let err = run_feed(&harness.engine, request(path)).await.unwrap_err();
        assert!(matches!(err, RecallError::InvalidArgument(_)));
        assert_eq!(harness.provider.request_count().await, 0);
    }

    #[tokio::test]
    async fn empty_file_is_rejected() {
        let harness = TestHarness::builder().build().await.unwrap();
        let path = harness.workspace().join("empty.txt");
        tokio::fs::write(&path, "   \n").await.unwrap();
        let err = run_feed(&harness.engine, request(path)).await.unwrap_err();
        assert!(err.to_string().contains("is empty"));
    }

    #[test]
    fn summary_mentions_failed_windows() {
        let report = IngestReport {
            windows: 3,
            failed_windows: 1,
            facts_extracted: 2,
            outcomes: vec![ConsolidationOutcome::Unchanged],
        };
        assert_eq!(
            summarize("legal", &report),
            "Fed legal: 2 facts from 3 windows (0 added, 0 updated, 0 deleted, 1 unchanged), 1 windows failed"
        );
    }
}
