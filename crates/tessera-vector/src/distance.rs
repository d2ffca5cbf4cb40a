//! Distance metrics for vector similarity.
//!
//! Tessera stores embeddings under one of two metrics. Both expose a
//! `similarity` where higher means more similar, so callers can apply
//! thresholds uniformly.

use std::fmt;

/// Distance metric for vector similarity calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Squared Euclidean (L2) distance.
    ///
    /// Range: [0, ∞), where 0 means identical vectors. Similarity is the
    /// monotonic transform `1 / (1 + distance)`, which lands in (0, 1] but
    /// is not probabilistically calibrated; thresholds against it are
    /// empirical configuration.
    #[default]
    SquaredL2,

    /// Inner product over L2-normalized vectors.
    ///
    /// Vectors are normalized on insert, so the dot product equals cosine
    /// similarity. Range: [-1, 1], where 1 means identical direction.
    InnerProduct,
}

impl DistanceMetric {
    /// Compute the similarity score between two vectors.
    ///
    /// Higher is more similar for both metrics. Exact duplicates score 1.0
    /// under `SquaredL2` only when the distance is exactly zero; callers
    /// must not rely on that.
    #[inline]
    pub fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

        match self {
            DistanceMetric::SquaredL2 => 1.0 / (1.0 + squared_l2_distance(a, b)),
            DistanceMetric::InnerProduct => dot_product(a, b),
        }
    }

    /// Compute the raw distance between two vectors (lower = more similar).
    ///
    /// For `InnerProduct` this is `1 - dot`, so identical normalized
    /// vectors have distance 0.
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

        match self {
            DistanceMetric::SquaredL2 => squared_l2_distance(a, b),
            DistanceMetric::InnerProduct => 1.0 - dot_product(a, b),
        }
    }

    /// Whether vectors must be L2-normalized before storage under this
    /// metric.
    pub fn requires_normalization(&self) -> bool {
        matches!(self, DistanceMetric::InnerProduct)
    }

    /// Get the name of this distance metric.
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::SquaredL2 => "squared_l2",
            DistanceMetric::InnerProduct => "inner_product",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "squared_l2" | "l2" | "euclidean" => Ok(DistanceMetric::SquaredL2),
            "inner_product" | "dot" | "dot_product" | "cosine" => Ok(DistanceMetric::InnerProduct),
            _ => Err(format!("Unknown distance metric: {}", s)),
        }
    }
}

/// L2-normalize a vector in place. Returns `false` for a zero-norm vector,
/// which cannot be normalized.
pub fn l2_normalize(v: &mut [f32]) -> bool {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}

// ============================================================================
// Optimized Distance Functions
// ============================================================================

/// Compute squared Euclidean (L2) distance between two vectors.
#[inline]
fn squared_l2_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0f32;

    // Manual loop unrolling for better performance
    let chunks = a.len() / 4;
    let remainder = a.len() % 4;

    for i in 0..chunks {
        let base = i * 4;
        let d0 = a[base] - b[base];
        let d1 = a[base + 1] - b[base + 1];
        let d2 = a[base + 2] - b[base + 2];
        let d3 = a[base + 3] - b[base + 3];
        sum += d0 * d0 + d1 * d1 + d2 * d2 + d3 * d3;
    }

    let start = chunks * 4;
    for i in 0..remainder {
        let idx = start + i;
        let d = a[idx] - b[idx];
        sum += d * d;
    }

    sum
}

/// Compute dot product between two vectors.
#[inline]
fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0f32;

    let chunks = a.len() / 4;
    let remainder = a.len() % 4;

    for i in 0..chunks {
        let base = i * 4;
        sum += a[base] * b[base]
            + a[base + 1] * b[base + 1]
            + a[base + 2] * b[base + 2]
            + a[base + 3] * b[base + 3];
    }

    let start = chunks * 4;
    for i in 0..remainder {
        let idx = start + i;
        sum += a[idx] * b[idx];
    }

    sum
}

// ============================================================================
// Tests
// ============================================================================
