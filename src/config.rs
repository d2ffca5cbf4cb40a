//! Engine configuration.
//!
//! [`EngineConfig`] carries chunking, retrieval and persistence settings.
//! It deserializes from TOML with per-field defaults, so a config file only
//! needs to name what it changes.

use crate::providers::RetryPolicy;
use crate::types::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tessera_vector::DistanceMetric;

/// How ingestion treats chunk-level embedding failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestPolicy {
    /// Commit the chunks that embedded successfully and report the rest.
    #[default]
    BestEffort,
    /// Abort the whole document if any chunk fails; the index is untouched.
    AllOrNothing,
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Target chunk size in approximate tokens.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in approximate tokens.
    pub chunk_overlap: usize,
    /// Distance metric for the vector index.
    pub metric: DistanceMetric,
    /// Candidates examined per duplicate check.
    pub dedup_top_n: usize,
    /// Similarity at or above which a chunk counts as a duplicate.
    pub dedup_threshold: f32,
    /// Maximum concurrent embedding calls during ingestion.
    pub embed_concurrency: usize,
    /// Chunk-failure handling during ingestion.
    pub ingest_policy: IngestPolicy,
    /// Snapshot directory. `None` disables persistence.
    pub data_path: Option<PathBuf>,
    /// Timeout and retry policy for provider calls.
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256,
            chunk_overlap: 32,
            metric: DistanceMetric::default(),
            dedup_top_n: 5,
            dedup_threshold: 0.85,
            embed_concurrency: 4,
            ingest_policy: IngestPolicy::default(),
            data_path: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Set chunking parameters.
    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    /// Set the distance metric.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Set duplicate-detection parameters.
    pub fn with_dedup(mut self, top_n: usize, threshold: f32) -> Self {
        self.dedup_top_n = top_n;
        self.dedup_threshold = threshold;
        self
    }

    /// Set the ingestion policy.
    pub fn with_ingest_policy(mut self, policy: IngestPolicy) -> Self {
        self.ingest_policy = policy;
        self
    }

    /// Enable persistence under `path`.
    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = Some(path.into());
        self
    }

    /// Set the provider retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if !(0.0..=1.0).contains(&self.dedup_threshold) {
            return Err(RagError::Config(format!(
                "dedup_threshold ({}) must be within [0, 1]",
                self.dedup_threshold
            )));
        }
        if self.embed_concurrency == 0 {
            return Err(RagError::Config(
                "embed_concurrency must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a configuration from a TOML file. Missing fields fall back to
    /// their defaults; the result is validated before it is returned.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RagError::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&raw).map_err(|e| {
            RagError::Config(format!("cannot parse config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_overlap() {
        let config = EngineConfig::default().with_chunking(16, 16);
        assert!(matches!(config.validate(), Err(RagError::Config(_))));
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let config = EngineConfig::default().with_dedup(5, 1.5);
        assert!(matches!(config.validate(), Err(RagError::Config(_))));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            chunk_size = 128
            metric = "inner_product"

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.chunk_size, 128);
        assert_eq!(config.metric, DistanceMetric::InnerProduct);
        assert_eq!(config.retry.max_attempts, 5);
        // Untouched fields keep their defaults.
        assert_eq!(config.chunk_overlap, 32);
        assert_eq!(config.dedup_top_n, 5);
        assert!((config.dedup_threshold - 0.85).abs() < f32::EPSILON);
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tessera.toml");
        std::fs::write(&path, "chunk_size = 64\nchunk_overlap = 8\n").unwrap();

        let config = EngineConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.chunk_size, 64);
        assert_eq!(config.chunk_overlap, 8);

        let err = EngineConfig::from_toml_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }
}
