//! Mock providers for integration tests.
//!
//! The embedder is deterministic: a text maps to a binary vector over a
//! fixed vocabulary, so semantic overlap between texts translates directly
//! into vector similarity and tests can reason about exact scores.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tessera::{AnswerGenerator, CancelSignal, EmbeddingProvider, ProviderError};

/// Default vocabulary for [`VocabEmbedder`]; covers the test documents.
pub const VOCAB: &[&str] = &[
    "machine",
    "learning",
    "subset",
    "ai",
    "relying",
    "statistics",
    "quantum",
    "gravity",
    "physics",
    "chunk",
];

/// Deterministic embedder: component `i` is 1.0 when the text contains
/// vocabulary word `i` (case-insensitive), else 0.0.
///
/// Identical texts embed identically, texts sharing words overlap, and
/// disjoint texts are orthogonal. Texts with no vocabulary words at all
/// produce the zero vector, which the inner-product metric rejects; keep
/// test inputs inside the vocabulary.
pub struct VocabEmbedder {
    vocab: Vec<String>,
    calls: AtomicUsize,
}

impl VocabEmbedder {
    pub fn new() -> Self {
        Self::with_vocab(VOCAB)
    }

    pub fn with_vocab(vocab: &[&str]) -> Self {
        Self {
            vocab: vocab.iter().map(|w| w.to_lowercase()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of embed calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn project(&self, text: &str) -> Vec<f32> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();
        self.vocab
            .iter()
            .map(|entry| {
                if words.iter().any(|w| w == entry) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect()
    }
}

impl Default for VocabEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for VocabEmbedder {
    fn id(&self) -> &str {
        "vocab-embedder-v1"
    }

    fn dimensions(&self) -> usize {
        self.vocab.len()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.project(text))
    }
}

/// Marker that makes [`FlakyEmbedder`] reject a text.
pub const POISON: &str = "POISON";

/// Wraps [`VocabEmbedder`] but permanently fails any text containing
/// [`POISON`], for partial-failure ingestion tests.
pub struct FlakyEmbedder {
    inner: VocabEmbedder,
}

impl FlakyEmbedder {
    pub fn new() -> Self {
        Self {
            inner: VocabEmbedder::new(),
        }
    }
}

impl Default for FlakyEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    fn id(&self) -> &str {
        // Same identity as the inner embedder: the vectors it produces are
        // identical, so snapshots interoperate across tests.
        self.inner.id()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if text.contains(POISON) {
            return Err(ProviderError::Unavailable("poisoned chunk".to_string()));
        }
        self.inner.embed(text).await
    }
}

/// Wraps [`VocabEmbedder`] and fires a [`CancelSignal`] after a given
/// number of successful embed calls, for mid-ingestion cancellation tests.
pub struct CancellingEmbedder {
    inner: VocabEmbedder,
    cancel: CancelSignal,
    after: usize,
}

impl CancellingEmbedder {
    pub fn new(cancel: CancelSignal, after: usize) -> Self {
        Self {
            inner: VocabEmbedder::new(),
            cancel,
            after,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CancellingEmbedder {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let vector = self.inner.embed(text).await?;
        if self.inner.calls() >= self.after {
            self.cancel.cancel();
        }
        Ok(vector)
    }
}

/// Generator returning a fixed canned answer.
pub struct MockGenerator {
    response: String,
    fail: bool,
}

impl MockGenerator {
    /// Answers every prompt with `response`.
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            fail: false,
        }
    }

    /// A generator whose answer cites the first context entry.
    pub fn citing() -> Self {
        Self::new("Based on the provided material [1], that is correct.")
    }

    /// A generator whose answer carries no citation markers.
    pub fn unciting() -> Self {
        Self::new("That is correct.")
    }

    /// Always fails.
    pub fn failing() -> Self {
        Self {
            response: String::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl AnswerGenerator for MockGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
        if self.fail {
            return Err(ProviderError::GenerationFailed("mock failure".to_string()));
        }
        Ok(self.response.clone())
    }
}

/// Generator that echoes the prompt back, so tests can assert on what the
/// engine actually sent.
pub struct EchoGenerator;

#[async_trait]
impl AnswerGenerator for EchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        Ok(prompt.to_string())
    }
}
