//! Common types for tessera-vector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Identity of a record within the index: its insertion position.
///
/// Stable for the process lifetime, but not across [`rebuild`]s, which
/// reassign positions.
///
/// [`rebuild`]: crate::FlatIndex::rebuild
pub type RecordId = usize;

/// A bounded contiguous slice of a source document, the atomic retrieval
/// unit. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk identifier.
    pub id: Uuid,
    /// Identifier of the source document this chunk was cut from.
    pub source_id: String,
    /// Zero-based position of this chunk within its source.
    pub position: usize,
    /// Total number of chunks the source was cut into. Invariant for a
    /// given source until re-ingestion.
    pub total_chunks: usize,
    /// The chunk text.
    pub text: String,
    /// When the chunk was created.
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// Create a new chunk with a fresh id and the current timestamp.
    pub fn new(
        source_id: impl Into<String>,
        position: usize,
        total_chunks: usize,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id: source_id.into(),
            position,
            total_chunks,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// A chunk together with its embedding, owned exclusively by the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    /// The chunk this record embeds.
    pub chunk: Chunk,
    /// The embedding vector. Always has the index's dimensionality.
    pub vector: Vec<f32>,
}

/// One ranked hit from a search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The matched record.
    pub record: Arc<IndexRecord>,
    /// Raw distance under the index metric (lower = closer).
    pub distance: f32,
    /// Similarity score (higher = more similar): `1 / (1 + distance)` for
    /// squared L2, raw dot product for the normalized inner-product metric.
    pub similarity: f32,
    /// 1-based, contiguous rank within the result list.
    pub rank: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_new() {
        let chunk = Chunk::new("doc", 2, 5, "hello");
        assert_eq!(chunk.source_id, "doc");
        assert_eq!(chunk.position, 2);
        assert_eq!(chunk.total_chunks, 5);
        assert_eq!(chunk.text, "hello");
    }

    #[test]
    fn test_chunk_ids_unique() {
        let a = Chunk::new("doc", 0, 1, "x");
        let b = Chunk::new("doc", 0, 1, "x");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_chunk_roundtrips_through_json() {
        let chunk = Chunk::new("doc", 0, 1, "hello");
        let json = serde_json::to_string(&chunk).unwrap();
        let back: Chunk = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chunk);
    }
}
