// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic embedding adapter for tests.
//!
//! Texts can be pinned to exact vectors, or to a vector with an exact cosine
//! similarity to a reference, so retrieval and consolidation thresholds can
//! be exercised precisely. Unpinned texts get a bag-of-words hash vector:
//! texts sharing words land close together.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use recall_core::RecallError;
use recall_core::traits::{EmbeddingAdapter, PluginAdapter};
use recall_core::types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};

/// Width of every vector the mock produces.
pub const DIMENSIONS: usize = 64;

#[derive(Default)]
struct State {
    pinned: HashMap<String, Vec<f32>>,
    fail_on: Vec<String>,
}

/// Embedding adapter with pinned and hashed vectors.
pub struct MockEmbedder {
    state: Mutex<State>,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Embed `text` as `vector`, zero-padded to [`DIMENSIONS`].
    pub fn pin(&self, text: &str, vector: Vec<f32>) {
        let vector = pad(&vector);
        self.state().pinned.insert(text.to_string(), vector);
    }

    /// Embed `text` so that its cosine similarity to `reference` is exactly
    /// `similarity`.
    ///
    /// The orthogonal component is derived from `text`, so two texts pinned
    /// against the same reference are distinct vectors.
    pub fn pin_similarity(&self, text: &str, reference: &[f32], similarity: f32) {
        let base = normalize(pad(reference));
        let seed = normalize(hash_vector(text));

        // Gram-Schmidt: strip the reference direction from the seed.
        let along = dot(&seed, &base);
        let mut ortho: Vec<f32> = seed.iter().zip(&base).map(|(s, b)| s - along * b).collect();
        if norm(&ortho) < 1e-6 {
            // Seed parallel to the reference; fall back to any other axis.
            let axis = base.iter().position(|v| v.abs() < 0.5).unwrap_or(DIMENSIONS - 1);
            ortho = vec![0.0; DIMENSIONS];
            ortho[axis] = 1.0;
            let along = dot(&ortho, &base);
            ortho = ortho.iter().zip(&base).map(|(o, b)| o - along * b).collect();
        }
        let ortho = normalize(ortho);

        let s = similarity.clamp(-1.0, 1.0);
        let c = (1.0 - s * s).max(0.0).sqrt();
        let vector = base.iter().zip(&ortho).map(|(b, o)| s * b + c * o).collect();
        self.state().pinned.insert(text.to_string(), vector);
    }

    /// Fail any embed call whose input contains `needle`.
    pub fn fail_on(&self, needle: &str) {
        self.state().fail_on.push(needle.to_string());
    }

    /// Number of `embed` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// The vector `text` embeds to.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        self.state()
            .pinned
            .get(text)
            .cloned()
            .unwrap_or_else(|| hash_vector(text))
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, RecallError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RecallError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, RecallError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let failing = {
            let state = self.state();
            input
                .texts
                .iter()
                .find_map(|t| state.fail_on.iter().find(|n| t.contains(n.as_str())).cloned())
        };
        if let Some(needle) = failing {
            return Err(RecallError::Embedding {
                message: format!("mock embedder configured to fail on {needle:?}"),
                source: None,
            });
        }

        let embeddings = input.texts.iter().map(|t| self.vector_for(t)).collect();
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: DIMENSIONS,
        })
    }
}

fn pad(vector: &[f32]) -> Vec<f32> {
    let mut padded = vec![0.0; DIMENSIONS];
    for (slot, value) in padded.iter_mut().zip(vector) {
        *slot = *value;
    }
    padded
}

/// Bag-of-words vector: each lowercase word bumps one hashed slot.
fn hash_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSIONS];
    let mut words = 0;
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        vector[(hasher.finish() % DIMENSIONS as u64) as usize] += 1.0;
        words += 1;
    }
    if words == 0 {
        vector[0] = 1.0;
    }
    vector
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

fn normalize(v: Vec<f32>) -> Vec<f32> {
    let n = norm(&v);
    if n == 0.0 {
        return v;
    }
    v.into_iter().map(|x| x / n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        dot(a, b) / (norm(a) * norm(b))
    }

    async fn embed(embedder: &MockEmbedder, text: &str) -> Vec<f32> {
        embedder
            .embed(EmbeddingInput::single(text))
            .await
            .unwrap()
            .embeddings
            .remove(0)
    }

    #[tokio::test]
    async fn pinned_vectors_are_padded() {
        let embedder = MockEmbedder::new();
        embedder.pin("q", vec![1.0, 0.0]);
        let v = embed(&embedder, "q").await;
        assert_eq!(v.len(), DIMENSIONS);
        assert_eq!(v[0], 1.0);
    }

    #[tokio::test]
    async fn pinned_similarity_is_exact() {
        let embedder = MockEmbedder::new();
        let q = [1.0, 0.0];
        for s in [0.95_f32, 0.81, 0.5, 0.0] {
            let text = format!("doc {s}");
            embedder.pin_similarity(&text, &q, s);
            let v = embed(&embedder, &text).await;
            assert!((cosine(&v, &pad(&q)) - s).abs() < 1e-4, "wanted {s}");
        }
    }

    #[tokio::test]
    async fn hashing_is_deterministic_and_word_based() {
        let embedder = MockEmbedder::new();
        let a = embed(&embedder, "User lives in Leeds").await;
        let b = embed(&embedder, "user lives in leeds").await;
        assert_eq!(a, b);
        assert_eq!(embedder.call_count(), 2);
    }

    #[tokio::test]
    async fn fail_on_matches_substrings() {
        let embedder = MockEmbedder::new();
        embedder.fail_on("boom");
        let err = embedder
            .embed(EmbeddingInput::single("User: boom"))
            .await
            .unwrap_err();
        assert!(matches!(err, RecallError::Embedding { .. }));
    }
}
