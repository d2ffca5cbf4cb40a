//! # Tessera
//!
//! A retrieval-augmented-generation (RAG) core: Tessera turns raw text into
//! searchable semantic chunks, finds near-duplicate or relevant content via
//! vector similarity, and assembles citation-annotated context for a
//! downstream answer generator.
//!
//! Tessera is a library, not an application. Front-ends, transports and
//! prompt engineering live elsewhere; the engine consumes two traits,
//! [`EmbeddingProvider`] (text to fixed-length vector) and
//! [`AnswerGenerator`] (prompt to text), and exposes an ingest/query/dedup
//! API.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tessera::{EngineConfig, QueryOptions, RagEngine};
//!
//! #[tokio::main]
//! async fn main() -> tessera::Result<()> {
//!     let engine = RagEngine::open(embedder, generator, EngineConfig::default()).await?;
//!
//!     let report = engine.ingest("handbook", &raw_text).await?;
//!     println!("indexed {} chunks", report.chunks_added);
//!
//!     let outcome = engine.query("What is the refund policy?", &QueryOptions::default()).await?;
//!     println!("{}", outcome.answer);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`chunker`] - Sliding-window text chunking with sentence snapping
//! - [`providers`] - Embedding/generation trait seams with retry and timeout
//! - [`dedup`] - Near-duplicate detection over the vector index
//! - [`context`] - Citation-numbered, size-bounded context assembly
//! - [`engine`] - Orchestration: ingest, query, persistence, state machine
//! - [`config`] - Engine configuration (builder + TOML)
//!
//! The vector index itself lives in the [`tessera_vector`] crate and is
//! re-exported here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunker;
pub mod config;
pub mod context;
pub mod dedup;
pub mod engine;
pub mod providers;
pub mod types;

pub use chunker::TextChunker;
pub use config::{EngineConfig, IngestPolicy};
pub use context::{AssembledContext, ContextAssembler, ContextEntry};
pub use dedup::{DeduplicationService, DuplicateMatch};
pub use engine::RagEngine;
pub use providers::{AnswerGenerator, EmbeddingProvider, ProviderError, RetryPolicy};
pub use types::{
    CancelSignal, ChunkFailure, EngineState, IngestReport, QueryOptions, QueryOutcome, RagError,
    Result,
};

pub use tessera_vector::{
    Chunk, DistanceMetric, Error as VectorError, FlatIndex, IndexManifest, IndexRecord,
    PersistenceStore, RecordId, SearchResult,
};
