//! Near-duplicate detection over the vector index.
//!
//! A candidate text is embedded and compared against the existing records;
//! the best match at or above the caller's similarity threshold is reported.
//! Checking never mutates the index, so callers decide what to do with a
//! hit (skip the ingest, replace the source, or ignore it).

use crate::providers::{embed_with_retry, EmbeddingProvider, RetryPolicy};
use crate::types::Result;
use std::sync::Arc;
use tessera_vector::{Chunk, FlatIndex};
use tracing::{debug, instrument};

/// The strongest existing match for a candidate text.
#[derive(Debug, Clone)]
pub struct DuplicateMatch {
    /// The text that was checked.
    pub candidate_text: String,
    /// The closest indexed chunk.
    pub matched_chunk: Chunk,
    /// Similarity between the candidate and the matched chunk.
    pub similarity: f32,
}

/// Read-only duplicate checker backed by the shared index.
pub struct DeduplicationService {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<FlatIndex>,
    top_n: usize,
    retry: RetryPolicy,
}

impl DeduplicationService {
    /// Create a checker over `index`. `top_n` is how many nearest
    /// candidates a check examines; values below 5 are raised to 5 so an
    /// exact duplicate cannot be crowded out by near ties.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<FlatIndex>,
        top_n: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            embedder,
            index,
            top_n: top_n.max(5),
            retry,
        }
    }

    /// Check whether `candidate_text` already exists in the index at or
    /// above `threshold` similarity.
    ///
    /// Returns the single best match, or `None` when nothing reaches the
    /// threshold (including when the index is empty).
    #[instrument(skip(self, candidate_text), fields(len = candidate_text.len()))]
    pub async fn check_duplicate(
        &self,
        candidate_text: &str,
        threshold: f32,
    ) -> Result<Option<DuplicateMatch>> {
        if self.index.is_empty() {
            return Ok(None);
        }

        let vector = embed_with_retry(self.embedder.as_ref(), candidate_text, &self.retry).await?;
        let results = self.index.search(&vector, self.top_n)?;

        let best = results
            .into_iter()
            .find(|result| result.similarity >= threshold);

        match best {
            Some(result) => {
                debug!(
                    similarity = result.similarity,
                    source = %result.record.chunk.source_id,
                    "Duplicate found"
                );
                Ok(Some(DuplicateMatch {
                    candidate_text: candidate_text.to_string(),
                    matched_chunk: result.record.chunk.clone(),
                    similarity: result.similarity,
                }))
            }
            None => Ok(None),
        }
    }
}
