//! # tessera-vector
//!
//! A pure-Rust embedded vector index for the Tessera RAG core.
//!
//! The index is a flat, append-only nearest-neighbor store: every search is
//! an exact brute-force distance scan over the stored vectors. At the scale
//! Tessera targets (tens of thousands of chunks) this is fast enough, and it
//! keeps the crate free of native dependencies. The [`FlatIndex`] contract is
//! deliberately narrow so an approximate-NN backend can replace the scan
//! later without touching callers.
//!
//! ## Features
//!
//! - **Pure Rust**: compiles anywhere Rust does
//! - **Thread-safe**: single-writer / multiple-reader locking; concurrent
//!   searches never block each other and never observe a half-applied write
//! - **Persistence**: atomic two-artifact snapshots (JSON manifest plus a
//!   binary vector blob) with a schema version gate
//! - **Two distance metrics**: squared L2 and inner product over
//!   L2-normalized vectors
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tessera_vector::{Chunk, DistanceMetric, FlatIndex};
//!
//! let index = FlatIndex::new(384, DistanceMetric::SquaredL2)?;
//!
//! let chunk = Chunk::new("doc1", 0, 1, "some chunk text");
//! let id = index.add(vec![0.1f32; 384], chunk)?;
//!
//! let results = index.search(&vec![0.1f32; 384], 10)?;
//! assert_eq!(results[0].rank, 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod distance;
pub mod error;
pub mod index;
pub mod persistence;
pub mod types;

pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use index::FlatIndex;
pub use persistence::{IndexManifest, PersistenceStore, SCHEMA_VERSION};
pub use types::{Chunk, IndexRecord, RecordId, SearchResult};
