// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests driving the memory engine through the test harness.

use std::time::Duration;

use recall_memory::backfill::BackfillOptions;
use recall_memory::{
    ConsolidationOutcome, ExtractedFact, KnowledgeIndexOpts, MemorySource, Relation, SearchFilter,
    TurnRecord,
};
use recall_test_utils::TestHarness;
use tokio_util::sync::CancellationToken;

const Q: [f32; 2] = [1.0, 0.0];

fn fact(text: &str, category: &str) -> ExtractedFact {
    ExtractedFact {
        fact: text.to_string(),
        category: category.to_string(),
    }
}

/// A turn that mentions Manchester leaves one fact about Manchester behind.
#[tokio::test]
async fn turn_about_manchester_is_remembered() {
    let harness = TestHarness::builder()
        .with_config(|c| c.memory.extract_relations = false)
        .with_mock_responses(vec![
            r#"[{"fact":"User lives in Manchester","category":"biographical"}]"#.to_string(),
        ])
        .build()
        .await
        .unwrap();

    harness.engine.record_turn(TurnRecord::new(
        "telegram:1",
        "telegram",
        "1",
        "I live in Manchester.",
        "Noted.",
    ));
    harness.settle().await;

    let store = harness.engine.store();
    assert_eq!(store.conversation_count().await.unwrap(), 1);
    assert_eq!(store.knowledge_count().await.unwrap(), 1);

    let facts = store.search_knowledge("where does the user live", 5).await.unwrap();
    assert!(facts[0].content.contains("Manchester"));
    assert_eq!(facts[0].category.as_deref(), Some("biographical"));
}

/// An UPDATE naming London's id replaces it with the Manchester fact.
#[tokio::test]
async fn update_replaces_superseded_fact() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.embedder.pin("User lives in Manchester", Q.to_vec());
    harness
        .embedder
        .pin_similarity("User lives in London", &Q, 0.9);

    let store = harness.engine.store();
    let london = store
        .index_knowledge(None, "User lives in London", "biographical")
        .await
        .unwrap();
    harness
        .add_provider_response(format!(
            r#"{{"action":"UPDATE","fact_id":"{london}","new_fact":"User lives in Manchester"}}"#
        ))
        .await;

    let outcome = harness
        .engine
        .extractor()
        .consolidate_fact(
            &fact("User lives in Manchester", "biographical"),
            "",
            &KnowledgeIndexOpts::default(),
        )
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        ConsolidationOutcome::Updated { replaced: Some(ref id), .. } if *id == london
    ));
    assert_eq!(store.knowledge_count().await.unwrap(), 1);
    let remaining = store.search_knowledge("User lives in Manchester", 5).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].content, "User lives in Manchester");
}

/// A NOOP leaves the knowledge count where it was.
#[tokio::test]
async fn noop_does_not_grow_knowledge() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.embedder.pin("User is vegetarian", Q.to_vec());
    harness
        .embedder
        .pin_similarity("User does not eat meat", &Q, 0.93);

    let store = harness.engine.store();
    store
        .index_knowledge(None, "User does not eat meat", "preference")
        .await
        .unwrap();
    harness.add_provider_response(r#"{"action":"NOOP"}"#).await;

    let before = store.knowledge_count().await.unwrap();
    harness
        .engine
        .extractor()
        .consolidate_fact(
            &fact("User is vegetarian", "preference"),
            "",
            &KnowledgeIndexOpts::default(),
        )
        .await
        .unwrap();
    assert_eq!(store.knowledge_count().await.unwrap(), before);
}

/// With the per-scope lock, the second of two concurrent near-duplicates
/// sees the first one's write and the NOOP decision keeps a single fact.
#[tokio::test]
async fn serialized_consolidation_prevents_duplicates() {
    let harness = TestHarness::builder()
        .with_config(|c| c.memory.serialize_consolidation = true)
        .build()
        .await
        .unwrap();
    harness.embedder.pin("Alice lives in Leeds", Q.to_vec());
    harness
        .embedder
        .pin_similarity("Alice lives in Leeds now", &Q, 0.95);
    harness.add_provider_response(r#"{"action":"NOOP"}"#).await;

    let extractor = harness.engine.extractor();
    let opts = KnowledgeIndexOpts::scoped("people");
    let first = fact("Alice lives in Leeds", "contact");
    let second = fact("Alice lives in Leeds now", "contact");
    let (a, b) = tokio::join!(
        extractor.consolidate_fact(&first, "people", &opts),
        extractor.consolidate_fact(&second, "people", &opts),
    );

    let outcomes = [a.unwrap(), b.unwrap()];
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, ConsolidationOutcome::Added { .. }))
            .count(),
        1
    );
    assert!(outcomes.contains(&ConsolidationOutcome::Unchanged));
    assert_eq!(harness.engine.store().knowledge_count().await.unwrap(), 1);
}

/// Fed documents land in the specialist's scope and surface first for it.
#[tokio::test]
async fn fed_document_is_scoped_and_recalled() {
    let harness = TestHarness::builder()
        .with_mock_responses(vec![
            r#"[{"fact":"Charlie booked The Grand Hall for June 15th","category":""}]"#.to_string(),
        ])
        .build()
        .await
        .unwrap();

    harness
        .engine
        .store()
        .index_knowledge(None, "User prefers morning meetings", "preference")
        .await
        .unwrap();

    let opts = KnowledgeIndexOpts {
        specialist: Some("events".into()),
        source_type: Some("whatsapp".into()),
        source_person: Some("Charlie".into()),
        source_date: Some("2025-11-06".into()),
        ..Default::default()
    };
    let report = harness
        .engine
        .ingest(
            "Charlie: booked The Grand Hall for June 15th, deposit paid.",
            "logistic",
            &opts,
        )
        .await
        .unwrap();
    assert_eq!(report.facts_extracted, 1);

    let context = harness
        .engine
        .recall_context("When is the venue booked?", 2, "events")
        .await
        .unwrap();
    let lines: Vec<&str> = context.lines().collect();
    assert_eq!(lines[0], "## Knowledge");
    assert_eq!(
        lines[1],
        "- [2025-11-06, Charlie via whatsapp] Charlie booked The Grand Hall for June 15th (logistic)"
    );
    assert!(lines[2].contains("User prefers morning meetings"));
}

/// Merged search interleaves both collections by score.
#[tokio::test]
async fn merged_search_spans_collections() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.embedder.pin("tea", Q.to_vec());
    harness
        .embedder
        .pin_similarity("User: I love tea\nAssistant: Me too", &Q, 0.9);
    harness.embedder.pin_similarity("User drinks tea daily", &Q, 0.95);

    let store = harness.engine.store();
    store
        .index_conversation("cli:1", "cli", "1", "I love tea", "Me too")
        .await;
    store
        .index_knowledge(None, "User drinks tea daily", "preference")
        .await
        .unwrap();

    let results = harness.engine.search("tea", 5, SearchFilter::All).await.unwrap();
    let sources: Vec<MemorySource> = results.iter().map(|r| r.source).collect();
    assert_eq!(sources, vec![MemorySource::Knowledge, MemorySource::Conversation]);

    let only_conversations = harness
        .engine
        .search("tea", 5, "conversations".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(only_conversations.len(), 1);
}

/// Relation extraction on a recorded turn writes to the workspace log.
#[tokio::test]
async fn recorded_turn_extracts_relations() {
    let harness = TestHarness::builder()
        .with_config(|c| c.worker.workers = 1)
        .build()
        .await
        .unwrap();
    // One worker runs jobs in submission order: index, relations, facts.
    harness
        .add_provider_response(r#"[{"s":"Dana","p":"manages","o":"Finance team"}]"#)
        .await;
    harness.add_provider_response("[]").await;

    harness.engine.record_turn(TurnRecord::new(
        "cli:1",
        "cli",
        "1",
        "Dana manages the finance team now.",
        "Thanks, noted.",
    ));
    harness.settle().await;

    let described = harness.engine.describe_relations("dana", "").await;
    assert_eq!(described, "Dana → manages → Finance team");
    assert!(harness.workspace().join("memory/relations.jsonl").exists());

    // Reopening the log sees the same relation.
    let reopened = recall_memory::RelationStore::open_in_workspace(harness.workspace())
        .await
        .unwrap();
    assert_eq!(
        reopened.query("finance team").await,
        harness.engine.relations().query("FINANCE TEAM").await
    );
    assert!(!reopened.add(Relation::new("dana", "MANAGES", "finance team")).await.unwrap());
}

fn write_session(dir: &std::path::Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).unwrap();
}

fn sessions_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_session(
        dir.path(),
        "telegram_42.json",
        r#"{
            "key": "telegram:42",
            "created": "2026-01-05T09:00:00Z",
            "messages": [
                {"role": "user", "content": "I just moved to Leeds"},
                {"role": "tool", "content": "{}"},
                {"role": "assistant", "content": "Welcome to Leeds!"},
                {"role": "user", "content": "Any coffee tips?"},
                {"role": "assistant", "content": "Try the market."},
                {"role": "user", "content": "thanks"}
            ]
        }"#,
    );
    write_session(
        dir.path(),
        "heartbeat.json",
        r#"{"key":"heartbeat","messages":[{"role":"user","content":"ping"},{"role":"assistant","content":"pong"}]}"#,
    );
    write_session(
        dir.path(),
        "cron-daily.json",
        r#"{"key":"cron:daily","messages":[{"role":"user","content":"run"},{"role":"assistant","content":"done"}]}"#,
    );
    write_session(dir.path(), "broken.json", "{not json");
    write_session(dir.path(), "notes.txt", "not a session");
    dir
}

fn fast() -> BackfillOptions {
    BackfillOptions {
        pace: Duration::ZERO,
        ..BackfillOptions::default()
    }
}

#[tokio::test]
async fn backfill_pairs_turns_and_skips_system_sessions() {
    let harness = TestHarness::builder().build().await.unwrap();
    let dir = sessions_dir();

    let stats = harness
        .engine
        .backfill(dir.path(), &fast(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.sessions_total, 2);
    assert_eq!(stats.sessions_processed, 2);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.turns_indexed, 2);
    assert_eq!(stats.facts_extracted, 0);

    let store = harness.engine.store();
    assert_eq!(store.conversation_count().await.unwrap(), 2);
    let hits = store.search_conversations("Leeds", 5).await.unwrap();
    assert!(hits.iter().all(|h| h.channel.as_deref() == Some("telegram")));
    assert!(hits.iter().any(|h| h.timestamp == "2026-01-05T09:00:00Z"));
    assert!(hits.iter().any(|h| h.timestamp == "2026-01-05T09:00:01Z"));
}

#[tokio::test]
async fn backfill_dry_run_writes_nothing() {
    let harness = TestHarness::builder().build().await.unwrap();
    let dir = sessions_dir();
    let opts = BackfillOptions {
        dry_run: true,
        extract_knowledge: true,
        ..fast()
    };

    let stats = harness
        .engine
        .backfill(dir.path(), &opts, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.turns_indexed, 2);
    assert_eq!(harness.engine.store().conversation_count().await.unwrap(), 0);
    assert_eq!(harness.provider.request_count().await, 0);
}

#[tokio::test]
async fn backfill_with_extraction_runs_per_turn() {
    let harness = TestHarness::builder().build().await.unwrap();
    let dir = sessions_dir();
    let opts = BackfillOptions {
        extract_knowledge: true,
        ..fast()
    };

    let stats = harness
        .engine
        .backfill(dir.path(), &opts, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.facts_extracted, 2);
    assert_eq!(harness.provider.request_count().await, 2);
}

#[tokio::test]
async fn cancelled_backfill_returns_partial_stats() {
    let harness = TestHarness::builder().build().await.unwrap();
    let dir = sessions_dir();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let (stats, err) = harness
        .engine
        .backfill(dir.path(), &fast(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, recall_core::RecallError::Cancelled));
    assert_eq!(stats.sessions_total, 2);
    assert_eq!(stats.sessions_processed, 0);
}

#[tokio::test]
async fn disabled_memory_ignores_turns() {
    let harness = TestHarness::builder()
        .with_config(|c| c.memory.enabled = false)
        .build()
        .await
        .unwrap();

    harness
        .engine
        .record_turn(TurnRecord::new("cli:1", "cli", "1", "I live in York", "ok"));
    harness.settle().await;

    assert_eq!(harness.engine.store().conversation_count().await.unwrap(), 0);
    assert_eq!(harness.provider.request_count().await, 0);
}
