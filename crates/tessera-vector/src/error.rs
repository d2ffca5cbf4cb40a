//! Error types for tessera-vector.

use thiserror::Error;

/// Result type for tessera-vector operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tessera-vector operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Dimension mismatch between a vector and the index.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensions the index was constructed with.
        expected: usize,
        /// Dimensions of the offending vector.
        actual: usize,
    },

    /// Invalid vector (e.g., empty, contains NaN or Inf).
    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    /// Persisted snapshot was written by an incompatible schema version.
    /// Never auto-migrated; the caller must rebuild the index.
    #[error("Schema version mismatch: store has v{found}, this build reads v{expected}; rebuild required")]
    SchemaVersionMismatch {
        /// Schema version this build reads.
        expected: u32,
        /// Schema version found on disk.
        found: u32,
    },

    /// Persisted snapshot is internally inconsistent (missing artifact,
    /// undecodable blob, count or dimension disagreement). The caller must
    /// rebuild; the data is never reinterpreted or truncated.
    #[error("Corrupt snapshot: {0}; rebuild required")]
    Corrupt(String),

    /// Persistence error (serialization, filesystem layout).
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
