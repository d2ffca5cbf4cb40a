//! Common types and error handling for the Tessera engine.

use crate::context::AssembledContext;
use crate::providers::ProviderError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// No records indexed yet.
    Empty,
    /// At least one ingestion has committed.
    Indexed,
    /// The persistence store is unreadable or unwritable; writes are
    /// rejected until a successful [`rebuild`](crate::RagEngine::rebuild).
    Degraded,
}

/// Errors surfaced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Index or persistence failure (dimension mismatch, corrupt or
    /// version-incompatible snapshot, I/O).
    #[error(transparent)]
    Index(#[from] tessera_vector::Error),

    /// Embedding or generation provider failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The engine is degraded; writes are rejected until a successful
    /// rebuild.
    #[error("engine is degraded; writes are rejected until a successful rebuild")]
    Degraded,

    /// All-or-nothing ingestion aborted because some chunks failed to
    /// embed. The index was not touched.
    #[error("ingestion of '{source_id}' aborted: {failed} of {total} chunks failed to embed and the policy is all-or-nothing")]
    IngestAborted {
        /// Source document identifier.
        source_id: String,
        /// Number of chunks that failed to embed.
        failed: usize,
        /// Total number of chunks in the document.
        total: usize,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RagError {
    /// Whether retrying the same operation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::Provider(e) if e.is_retryable())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// A chunk that failed to embed during ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkFailure {
    /// Identifier of the failing chunk.
    pub chunk_id: Uuid,
    /// Position of the chunk within its source.
    pub position: usize,
    /// Human-readable failure description.
    pub error: String,
    /// Whether re-ingesting can reasonably succeed.
    pub retryable: bool,
}

/// Outcome of one ingestion call.
///
/// Chunk-level failures are collected here rather than aborting the batch;
/// the successfully embedded chunks are committed (unless the engine runs
/// the all-or-nothing policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// Source document identifier.
    pub source_id: String,
    /// Number of chunks committed to the index.
    pub chunks_added: usize,
    /// Chunks that failed to embed.
    pub failures: Vec<ChunkFailure>,
    /// Whether the operation was cancelled before all chunks were
    /// processed. Committed chunks stay committed.
    pub cancelled: bool,
}

impl IngestReport {
    /// Number of chunks that failed to embed.
    pub fn chunks_failed(&self) -> usize {
        self.failures.len()
    }
}

/// Parameters for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Maximum number of chunks to retrieve.
    pub k: usize,
    /// Character budget for the assembled context.
    pub max_chars: usize,
    /// Minimum similarity for a chunk to be considered relevant.
    pub min_similarity: f32,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            k: 5,
            max_chars: 4000,
            min_similarity: 0.5,
        }
    }
}

/// Outcome of one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    /// The generated answer. Empty when the query was cancelled before
    /// generation.
    pub answer: String,
    /// Distinct `[n]` citation markers found in the answer, ascending.
    pub citations_used: Vec<usize>,
    /// The context the answer was generated against.
    pub context: AssembledContext,
    /// True when context was non-empty but the answer carries no citation
    /// markers. A quality flag, not an error.
    pub uncited: bool,
    /// True when the query was cancelled; `context` holds the partial
    /// ranking computed so far and `answer` is empty.
    pub cancelled: bool,
}

/// Cooperative cancellation flag for ingest and query operations.
///
/// Cheap to clone; cancelling takes effect at chunk/result granularity. A
/// cancelled operation returns its partial result with a `cancelled`
/// indicator set, never an error.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    /// Create a fresh, non-cancelled signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
