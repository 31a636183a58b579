// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Overlapping character windows for long extraction inputs.

/// Split `content` into windows of `size` characters, each starting
/// `size - overlap` characters after the previous one.
///
/// Content no longer than one window is returned whole. Windows never split
/// a multi-byte character. An `overlap >= size` is clamped so every window
/// advances by at least one character.
pub fn windows(content: &str, size: usize, overlap: usize) -> Vec<&str> {
    let size = size.max(1);
    let boundaries: Vec<usize> = content
        .char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(content.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    if char_count <= size {
        return vec![content];
    }

    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < char_count {
        let end = (start + size).min(char_count);
        chunks.push(&content[boundaries[start]..boundaries[end]]);
        if end == char_count {
            break;
        }
        start += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn short_content_is_one_window() {
        assert_eq!(windows("hello", 1500, 200), vec!["hello"]);
        assert_eq!(windows("", 1500, 200), vec![""]);
    }

    #[test]
    fn windows_overlap_by_requested_amount() {
        let text: String = ('a'..='j').collect();
        let chunks = windows(&text, 4, 1);
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn final_window_may_be_short() {
        let text: String = ('a'..='k').collect();
        let chunks = windows(&text, 4, 1);
        assert_eq!(chunks, vec!["abcd", "defg", "ghij", "jk"]);
    }

    #[test]
    fn multibyte_characters_are_not_split() {
        let text = "ééééé";
        assert_eq!(windows(text, 2, 0), vec!["éé", "éé", "é"]);
    }

    #[test]
    fn default_sizes_on_long_input() {
        let text = "x".repeat(3000);
        let chunks = windows(&text, 1500, 200);
        let lengths: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
        assert_eq!(lengths, vec![1500, 1500, 400]);
    }

    proptest! {
        #[test]
        fn windows_cover_all_content(text in "\\PC{0,300}", size in 1usize..50, overlap in 0usize..60) {
            let chunks = windows(&text, size, overlap);
            let total = text.chars().count();
            prop_assert!(!chunks.is_empty());
            if total <= size {
                prop_assert_eq!(chunks.clone(), vec![text.as_str()]);
            }
            for chunk in &chunks {
                prop_assert!(chunk.chars().count() <= size.max(1));
            }
            prop_assert!(text.starts_with(chunks[0]));
            prop_assert!(text.ends_with(chunks[chunks.len() - 1]));
        }
    }
}
