// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; nothing is recorded unless the host installs
//! a recorder.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all memory metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "recall_conversations_indexed_total",
        "Conversation turns written to the conversations collection"
    );
    describe_counter!(
        "recall_facts_extracted_total",
        "Facts returned by extraction calls"
    );
    describe_counter!(
        "recall_consolidation_actions_total",
        "Consolidation outcomes by action"
    );
    describe_counter!(
        "recall_relations_added_total",
        "New relations appended to the relation log"
    );
    describe_counter!("recall_jobs_total", "Background jobs by kind and outcome");
    describe_counter!(
        "recall_jobs_dropped_total",
        "Background jobs dropped because the queue was full or closed"
    );
    describe_gauge!("recall_jobs_queued", "Background jobs waiting for a worker");
    describe_histogram!(
        "recall_job_duration_seconds",
        "Wall time of background jobs in seconds"
    );
}

pub fn record_conversation_indexed() {
    metrics::counter!("recall_conversations_indexed_total").increment(1);
}

pub fn record_facts_extracted(count: usize) {
    metrics::counter!("recall_facts_extracted_total").increment(count as u64);
}

pub fn record_consolidation(action: &'static str) {
    metrics::counter!("recall_consolidation_actions_total", "action" => action).increment(1);
}

pub fn record_relation_added() {
    metrics::counter!("recall_relations_added_total").increment(1);
}

/// Record a finished background job.
pub fn record_job(kind: &'static str, outcome: &'static str, seconds: f64) {
    metrics::counter!("recall_jobs_total", "kind" => kind, "outcome" => outcome).increment(1);
    metrics::histogram!("recall_job_duration_seconds", "kind" => kind).record(seconds);
}

pub fn record_job_dropped(kind: &'static str) {
    metrics::counter!("recall_jobs_dropped_total", "kind" => kind).increment(1);
}

pub fn set_jobs_queued(count: usize) {
    metrics::gauge!("recall_jobs_queued").set(count as f64);
}
