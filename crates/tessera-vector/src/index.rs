//! Flat brute-force vector index.
//!
//! Append-only nearest-neighbor store: a search is an exact distance scan
//! over every stored record. Deletion is supported only by [`FlatIndex::rebuild`],
//! which reconstructs the store excluding targeted records.

use crate::distance::{l2_normalize, DistanceMetric};
use crate::error::{Error, Result};
use crate::types::{Chunk, IndexRecord, RecordId, SearchResult};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Thread-safe flat vector index over chunk embeddings.
///
/// # Concurrency
///
/// Single-writer / multiple-reader: mutation (`add`, `add_batch`,
/// `rebuild`) takes an exclusive lock, searches take a shared lock.
/// Concurrent searches never block each other, and a search observes
/// either the pre-write or the post-write record list, never a partially
/// applied mutation. Embeddings are computed by callers before the lock is
/// taken, so the critical section is only the append itself.
#[derive(Debug)]
pub struct FlatIndex {
    records: RwLock<Vec<Arc<IndexRecord>>>,
    dimensions: usize,
    metric: DistanceMetric,
}

impl FlatIndex {
    /// Create an empty index.
    ///
    /// `dimensions` is fixed for the lifetime of the index; every stored
    /// vector must have exactly this length.
    pub fn new(dimensions: usize, metric: DistanceMetric) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::InvalidVector("Dimensions must be > 0".to_string()));
        }

        Ok(Self {
            records: RwLock::new(Vec::new()),
            dimensions,
            metric,
        })
    }

    /// Get the vector dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Get the distance metric.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Get the number of records in the index.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a vector with its chunk.
    ///
    /// Returns the record id: the record's position in the index, stable
    /// for the process lifetime but reassigned by [`FlatIndex::rebuild`].
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if `vector.len()` differs from the index
    /// dimensionality; `InvalidVector` on NaN/Inf components, or a
    /// zero-norm vector under the inner-product metric.
    #[instrument(skip(self, vector, chunk), fields(dim = vector.len(), source = %chunk.source_id))]
    pub fn add(&self, vector: Vec<f32>, chunk: Chunk) -> Result<RecordId> {
        let record = Arc::new(self.prepare(vector, chunk)?);

        let mut records = self.records.write();
        records.push(record);
        let id = records.len() - 1;

        trace!(id, "Inserted record");
        Ok(id)
    }

    /// Insert multiple vectors under a single lock acquisition.
    ///
    /// All items are validated before any is inserted, so a failure leaves
    /// the index untouched. Returns the assigned record ids in input order.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub fn add_batch(&self, items: Vec<(Vec<f32>, Chunk)>) -> Result<Vec<RecordId>> {
        let mut prepared = Vec::with_capacity(items.len());
        for (vector, chunk) in items {
            prepared.push(Arc::new(self.prepare(vector, chunk)?));
        }

        let mut records = self.records.write();
        let first = records.len();
        let ids = (first..first + prepared.len()).collect();
        records.extend(prepared);

        debug!(count = records.len() - first, "Batch inserted records");
        Ok(ids)
    }

    /// Search for the `k` nearest records to `query`.
    ///
    /// Results are sorted by descending similarity with 1-based contiguous
    /// ranks. Records at identical distance keep insertion order (stable
    /// sort). An empty index yields an empty result list, not an error;
    /// `k` larger than the index returns every record, fully ranked.
    #[instrument(skip(self, query), fields(dim = query.len()))]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if query.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let mut query = query.to_vec();
        if self.metric.requires_normalization() {
            // A zero query cannot be normalized; it scores 0 everywhere.
            l2_normalize(&mut query);
        }

        let mut scored: Vec<SearchResult> = {
            let records = self.records.read();
            records
                .iter()
                .map(|record| {
                    let distance = self.metric.distance(&query, &record.vector);
                    let similarity = self.metric.similarity(&query, &record.vector);
                    SearchResult {
                        record: Arc::clone(record),
                        distance,
                        similarity,
                        rank: 0,
                    }
                })
                .collect()
        };

        // Stable sort: equal similarity preserves insertion order.
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        scored.truncate(k);

        for (i, result) in scored.iter_mut().enumerate() {
            result.rank = i + 1;
        }

        debug!(count = scored.len(), "Search completed");
        Ok(scored)
    }

    /// Rebuild the index, excluding the given record ids.
    ///
    /// This is the only deletion mechanism: surviving records are packed
    /// into a fresh record list, which reassigns their ids. Returns the
    /// number of records removed.
    #[instrument(skip(self, excluding), fields(excluded = excluding.len()))]
    pub fn rebuild(&self, excluding: &HashSet<RecordId>) -> usize {
        let mut records = self.records.write();
        let before = records.len();

        let survivors: Vec<Arc<IndexRecord>> = records
            .iter()
            .enumerate()
            .filter(|(id, _)| !excluding.contains(id))
            .map(|(_, record)| Arc::clone(record))
            .collect();

        *records = survivors;
        let removed = before - records.len();

        debug!(removed, remaining = records.len(), "Rebuilt index");
        removed
    }

    /// Snapshot of all records in insertion order, for persistence.
    pub fn records(&self) -> Vec<Arc<IndexRecord>> {
        self.records.read().clone()
    }

    fn prepare(&self, mut vector: Vec<f32>, chunk: Chunk) -> Result<IndexRecord> {
        if vector.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }

        if vector.iter().any(|v| v.is_nan() || v.is_infinite()) {
            return Err(Error::InvalidVector(
                "Vector contains NaN or Inf".to_string(),
            ));
        }

        if self.metric.requires_normalization() && !l2_normalize(&mut vector) {
            return Err(Error::InvalidVector(
                "Zero-norm vector cannot be stored under the inner-product metric".to_string(),
            ));
        }

        Ok(IndexRecord { chunk, vector })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(n: usize) -> Chunk {
        Chunk::new("doc", n, 10, format!("chunk {}", n))
    }

    #[test]
    fn test_insert_and_search() {
        let index = FlatIndex::new(3, DistanceMetric::SquaredL2).unwrap();

        index.add(vec![1.0, 0.0, 0.0], chunk(0)).unwrap();
        index.add(vec![0.0, 1.0, 0.0], chunk(1)).unwrap();
        index.add(vec![0.9, 0.1, 0.0], chunk(2)).unwrap();

        assert_eq!(index.len(), 3);

        let results = index.search(&[1.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].record.chunk.position, 0);
        assert!((results[0].similarity - 1.0).abs() < 0.0001);
        // Ranks are 1-based and contiguous.
        let ranks: Vec<usize> = results.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let index = FlatIndex::new(3, DistanceMetric::SquaredL2).unwrap();

        let result = index.add(vec![1.0, 0.0], chunk(0));
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));

        index.add(vec![1.0, 0.0, 0.0], chunk(0)).unwrap();
        let result = index.search(&[1.0, 0.0], 5);
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn test_nan_rejected() {
        let index = FlatIndex::new(2, DistanceMetric::SquaredL2).unwrap();
        let result = index.add(vec![f32::NAN, 0.0], chunk(0));
        assert!(matches!(result, Err(Error::InvalidVector(_))));
    }

    #[test]
    fn test_empty_index_search_returns_empty() {
        let index = FlatIndex::new(3, DistanceMetric::SquaredL2).unwrap();
        let results = index.search(&[1.0, 0.0, 0.0], 5).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_k_larger_than_index() {
        let index = FlatIndex::new(2, DistanceMetric::SquaredL2).unwrap();
        index.add(vec![0.0, 1.0], chunk(0)).unwrap();
        index.add(vec![1.0, 0.0], chunk(1)).unwrap();

        let results = index.search(&[0.0, 1.0], 100).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].rank, 2);
    }

    #[test]
    fn test_ties_preserve_insertion_order() {
        let index = FlatIndex::new(2, DistanceMetric::SquaredL2).unwrap();
        // Three records equidistant from the query.
        index.add(vec![1.0, 0.0], chunk(0)).unwrap();
        index.add(vec![-1.0, 0.0], chunk(1)).unwrap();
        index.add(vec![0.0, 1.0], chunk(2)).unwrap();

        let results = index.search(&[0.0, 0.0], 3).unwrap();
        let positions: Vec<usize> = results.iter().map(|r| r.record.chunk.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_inner_product_normalizes_on_insert() {
        let index = FlatIndex::new(2, DistanceMetric::InnerProduct).unwrap();
        // Same direction, different magnitude: identical after normalization.
        index.add(vec![3.0, 4.0], chunk(0)).unwrap();

        let results = index.search(&[6.0, 8.0], 1).unwrap();
        assert!((results[0].similarity - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_inner_product_rejects_zero_vector() {
        let index = FlatIndex::new(2, DistanceMetric::InnerProduct).unwrap();
        let result = index.add(vec![0.0, 0.0], chunk(0));
        assert!(matches!(result, Err(Error::InvalidVector(_))));
    }

    #[test]
    fn test_add_batch_all_or_nothing_validation() {
        let index = FlatIndex::new(2, DistanceMetric::SquaredL2).unwrap();
        let items = vec![
            (vec![1.0, 0.0], chunk(0)),
            (vec![1.0, 0.0, 0.0], chunk(1)), // wrong dimensions
        ];
        assert!(index.add_batch(items).is_err());
        assert_eq!(index.len(), 0);

        let ids = index
            .add_batch(vec![(vec![1.0, 0.0], chunk(0)), (vec![0.0, 1.0], chunk(1))])
            .unwrap();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_rebuild_excluding() {
        let index = FlatIndex::new(2, DistanceMetric::SquaredL2).unwrap();
        index.add(vec![1.0, 0.0], chunk(0)).unwrap();
        index.add(vec![0.0, 1.0], chunk(1)).unwrap();
        index.add(vec![1.0, 1.0], chunk(2)).unwrap();

        let removed = index.rebuild(&HashSet::from([1]));
        assert_eq!(removed, 1);
        assert_eq!(index.len(), 2);

        // Surviving records are re-packed in their original relative order.
        let records = index.records();
        assert_eq!(records[0].chunk.position, 0);
        assert_eq!(records[1].chunk.position, 2);
    }

    #[test]
    fn test_duplicate_insert_ranks_first() {
        let index = FlatIndex::new(3, DistanceMetric::SquaredL2).unwrap();
        index.add(vec![0.2, 0.4, 0.6], chunk(0)).unwrap();
        index.add(vec![0.9, 0.0, 0.1], chunk(1)).unwrap();

        let duplicate = vec![0.2, 0.4, 0.6];
        index.add(duplicate.clone(), chunk(2)).unwrap();

        let results = index.search(&duplicate, 3).unwrap();
        assert_eq!(results[0].rank, 1);
        // The original and its duplicate tie at distance zero; insertion
        // order puts the original first.
        assert_eq!(results[0].record.chunk.position, 0);
        assert_eq!(results[1].record.chunk.position, 2);
        assert!((results[0].similarity - 1.0).abs() < 0.0001);
    }
}
