// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tolerant decoding of JSON emitted by language models.
//!
//! Model replies are cleaned in a fixed order before parsing: reasoning
//! blocks (`<think>...</think>`) are removed, then surrounding markdown code
//! fences. A list is parsed as a JSON array first and, failing that, as a
//! single object wrapped into a one-element list.

use std::sync::LazyLock;

use recall_core::error::RecallError;
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::types::truncate_runes;

/// `<think>` reasoning blocks emitted by some models ahead of the answer.
static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>\s*").unwrap());

/// Strip reasoning blocks and code fences, returning the JSON payload.
pub fn clean_model_output(raw: &str) -> String {
    let without_think = THINK_BLOCK.replace_all(raw.trim(), "");
    let mut text = without_think.trim();
    text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text = text.strip_suffix("```").unwrap_or(text);
    text.trim().to_string()
}

/// Decode a JSON array of `T`, accepting a lone object as a one-element list.
///
/// `accept_single` rejects lone objects that decoded but carry no content,
/// e.g. `{}` deserializing into defaults.
pub fn decode_list<T, F>(raw: &str, accept_single: F) -> Result<Vec<T>, RecallError>
where
    T: DeserializeOwned,
    F: Fn(&T) -> bool,
{
    let cleaned = clean_model_output(raw);
    match serde_json::from_str::<Vec<T>>(&cleaned) {
        Ok(items) => Ok(items),
        Err(array_err) => match serde_json::from_str::<T>(&cleaned) {
            Ok(single) if accept_single(&single) => Ok(vec![single]),
            _ => Err(RecallError::Parse {
                message: format!(
                    "{array_err} (response: {})",
                    truncate_runes(&cleaned, 200)
                ),
            }),
        },
    }
}

/// Decode a single JSON object of `T`.
pub fn decode_object<T: DeserializeOwned>(raw: &str) -> Result<T, RecallError> {
    let cleaned = clean_model_output(raw);
    serde_json::from_str(&cleaned).map_err(|e| RecallError::Parse {
        message: format!("{e} (response: {})", truncate_runes(&cleaned, 200)),
    })
}
