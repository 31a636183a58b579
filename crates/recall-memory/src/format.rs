// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text rendering of search results for prompt injection.

use std::fmt::Write;

use chrono::DateTime;

use crate::types::{MemoryResult, MemorySource, truncate_runes};

const PREVIEW_RUNES: usize = 200;

/// Render results as a `## Knowledge` block followed by a `## Conversations`
/// block. Input order is kept within each block.
pub fn format_results(results: &[MemoryResult]) -> String {
    if results.is_empty() {
        return "No memories found.".to_string();
    }

    let (knowledge, conversations): (Vec<&MemoryResult>, Vec<&MemoryResult>) = results
        .iter()
        .partition(|r| r.source == MemorySource::Knowledge);

    let mut out = String::new();

    if !knowledge.is_empty() {
        out.push_str("## Knowledge\n");
        for r in &knowledge {
            let category = r
                .category
                .as_deref()
                .map(|c| format!(" ({c})"))
                .unwrap_or_default();
            let _ = writeln!(out, "- {} {}{}", provenance(r), r.content, category);
        }
    }

    if !conversations.is_empty() {
        if !knowledge.is_empty() {
            out.push('\n');
        }
        out.push_str("## Conversations\n");
        for r in &conversations {
            let channel = r
                .channel
                .as_deref()
                .map(|c| format!(", {c}"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "- [{}{}] {}",
                format_date(&r.timestamp),
                channel,
                preview(&r.content)
            );
        }
    }

    out
}

/// `[date, attribution]` prefix for a knowledge line.
fn provenance(r: &MemoryResult) -> String {
    let date = r.source_date.as_deref().unwrap_or(&r.timestamp);
    let mut parts = vec![format_date(date)];

    let attribution = match (
        r.source_person.as_deref(),
        r.source_type.as_deref(),
        r.source_name.as_deref(),
    ) {
        (Some(person), Some(kind), _) => Some(format!("{person} via {kind}")),
        (Some(person), None, _) => Some(person.to_string()),
        (None, _, Some(name)) => Some(name.to_string()),
        (None, Some(kind), None) => Some(kind.to_string()),
        (None, None, None) => None,
    };
    parts.extend(attribution);

    format!("[{}]", parts.join(", "))
}

/// `YYYY-MM-DD` for RFC3339 input, `unknown` when empty, the input otherwise.
pub fn format_date(ts: &str) -> String {
    if ts.is_empty() {
        return "unknown".to_string();
    }
    match DateTime::parse_from_rfc3339(ts) {
        Ok(dt) => dt.format("%Y-%m-%d").to_string(),
        Err(_) => ts.to_string(),
    }
}

fn preview(content: &str) -> String {
    let cut = truncate_runes(content, PREVIEW_RUNES);
    if cut.len() < content.len() {
        format!("{cut}...")
    } else {
        content.to_string()
    }
}
