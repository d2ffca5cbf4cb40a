//! Persistence layer for tessera-vector.
//!
//! A snapshot is two artifacts under one base directory:
//!
//! - `meta.json`: the [`IndexManifest`] with schema version,
//!   dimensionality, metric, embedding-provider identity, similarity
//!   threshold and the chunk records, in insertion order.
//! - `vectors.bin`: the raw vectors as a bincode blob, same order as the
//!   manifest's chunks.
//!
//! Each artifact is written to a temporary file and atomically renamed
//! over the canonical path, so a partial write never corrupts the last
//! good snapshot. Loading requires both artifacts to agree; any
//! disagreement is reported as [`Error::Corrupt`] and the caller must
//! rebuild.

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::index::FlatIndex;
use crate::types::Chunk;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Snapshot schema version this build reads and writes.
///
/// A snapshot with any other version fails to load with
/// [`Error::SchemaVersionMismatch`]; it is never migrated silently.
pub const SCHEMA_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "meta.json";
const VECTORS_FILE: &str = "vectors.bin";

/// Index metadata stored alongside the vector blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Snapshot schema version.
    pub schema_version: u32,
    /// Generation id shared with the vector blob. The two artifacts are
    /// renamed independently, so a crash between the renames can leave
    /// artifacts from different saves on disk; a generation mismatch at
    /// load reports that as corruption even when record counts happen to
    /// agree.
    pub generation: Uuid,
    /// Vector dimensionality of the index.
    pub dimensions: usize,
    /// Distance metric the index was built with.
    pub metric: DistanceMetric,
    /// Identity of the embedding provider that produced the vectors.
    pub provider_id: String,
    /// Duplicate-detection similarity threshold in effect when saved.
    pub similarity_threshold: f32,
    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
    /// Chunk records in insertion order, parallel to the vector blob.
    pub chunks: Vec<Chunk>,
}

/// On-disk layout of `vectors.bin`.
#[derive(Serialize, Deserialize)]
struct VectorBlob {
    generation: Uuid,
    vectors: Vec<Vec<f32>>,
}

/// Durable, crash-safe save/load of an index and its metadata.
pub struct PersistenceStore {
    base_path: PathBuf,
}

impl PersistenceStore {
    /// Create a store rooted at `base_path`. The directory is created on
    /// first save.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// The directory holding both snapshot artifacts.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn manifest_path(&self) -> PathBuf {
        self.base_path.join(MANIFEST_FILE)
    }

    fn vectors_path(&self) -> PathBuf {
        self.base_path.join(VECTORS_FILE)
    }

    /// Atomically persist the index and its metadata.
    ///
    /// Both artifacts carry a fresh generation id; the vector blob is
    /// committed before the manifest, so if a crash lands between the two
    /// renames the next load sees a generation mismatch and reports
    /// [`Error::Corrupt`] instead of mixing saves.
    #[instrument(skip(self, index, provider_id), fields(records = index.len()))]
    pub async fn save(
        &self,
        index: &FlatIndex,
        provider_id: &str,
        similarity_threshold: f32,
    ) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_path).await?;

        let records = index.records();
        let mut chunks = Vec::with_capacity(records.len());
        let mut vectors = Vec::with_capacity(records.len());
        for record in &records {
            chunks.push(record.chunk.clone());
            vectors.push(record.vector.clone());
        }

        let generation = Uuid::new_v4();
        let blob = bincode::serialize(&VectorBlob { generation, vectors })
            .map_err(|e| Error::Persistence(format!("Failed to serialize vectors: {}", e)))?;
        write_atomic(&self.vectors_path(), &blob).await?;

        let manifest = IndexManifest {
            schema_version: SCHEMA_VERSION,
            generation,
            dimensions: index.dimensions(),
            metric: index.metric(),
            provider_id: provider_id.to_string(),
            similarity_threshold,
            saved_at: Utc::now(),
            chunks,
        };
        let manifest_json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| Error::Persistence(format!("Failed to serialize manifest: {}", e)))?;
        write_atomic(&self.manifest_path(), manifest_json.as_bytes()).await?;

        info!(path = ?self.base_path, records = records.len(), "Saved snapshot");
        Ok(())
    }

    /// Load the last snapshot.
    ///
    /// Returns `Ok(None)` when no snapshot exists (first run). Fails with
    /// [`Error::SchemaVersionMismatch`] for an incompatible schema and
    /// [`Error::Corrupt`] when the artifacts are missing, undecodable or
    /// disagree on generation, record count or dimensionality.
    #[instrument(skip(self), fields(path = ?self.base_path))]
    pub async fn load(&self) -> Result<Option<(FlatIndex, IndexManifest)>> {
        let manifest_path = self.manifest_path();
        let vectors_path = self.vectors_path();

        let have_manifest = manifest_path.exists();
        let have_vectors = vectors_path.exists();
        if !have_manifest && !have_vectors {
            debug!("No snapshot found");
            return Ok(None);
        }
        if !have_manifest || !have_vectors {
            let missing = if have_manifest {
                VECTORS_FILE
            } else {
                MANIFEST_FILE
            };
            return Err(Error::Corrupt(format!("missing artifact {}", missing)));
        }

        let manifest_json = tokio::fs::read_to_string(&manifest_path).await?;
        let manifest: IndexManifest = serde_json::from_str(&manifest_json)
            .map_err(|e| Error::Corrupt(format!("undecodable manifest: {}", e)))?;

        if manifest.schema_version != SCHEMA_VERSION {
            return Err(Error::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                found: manifest.schema_version,
            });
        }

        let raw = tokio::fs::read(&vectors_path).await?;
        let blob: VectorBlob = bincode::deserialize(&raw)
            .map_err(|e| Error::Corrupt(format!("undecodable vector blob: {}", e)))?;

        if blob.generation != manifest.generation {
            return Err(Error::Corrupt(format!(
                "manifest generation {} does not match vector blob generation {}",
                manifest.generation, blob.generation
            )));
        }

        let vectors = blob.vectors;
        if vectors.len() != manifest.chunks.len() {
            return Err(Error::Corrupt(format!(
                "manifest lists {} chunks but blob holds {} vectors",
                manifest.chunks.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != manifest.dimensions) {
            return Err(Error::Corrupt(format!(
                "stored vector has {} dimensions, manifest declares {}",
                bad.len(),
                manifest.dimensions
            )));
        }

        let index = FlatIndex::new(manifest.dimensions, manifest.metric)?;
        let items = vectors
            .into_iter()
            .zip(manifest.chunks.iter().cloned())
            .collect();
        index
            .add_batch(items)
            .map_err(|e| Error::Corrupt(format!("stored vector rejected: {}", e)))?;

        info!(records = index.len(), "Loaded snapshot");
        Ok(Some((index, manifest)))
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
