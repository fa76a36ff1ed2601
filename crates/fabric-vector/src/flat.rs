use std::cmp::Ordering;
use std::collections::BTreeMap;

use fabric_core::errors::VectorError;
use fabric_core::Oid;

use crate::similarity::{cosine_similarity, l2_distance, Metric};
use crate::{Hit, Index};

/// A flat, exact vector index: a `BTreeMap` keyed by OID (so iteration is already in
/// lexicographic order, which is also the configured tie-break), scored in full on
/// every search. Exact, not approximate — adequate for the sizes L1/L2 cache at any
/// one time; larger deployments would swap this for an ANN backend behind the same
/// `Index` trait.
pub struct FlatIndex {
    metric: Metric,
    vector_dim: usize,
    entries: BTreeMap<Oid, Vec<f32>>,
}

impl FlatIndex {
    pub fn new(metric: Metric, vector_dim: usize) -> Self {
        Self { metric, vector_dim, entries: BTreeMap::new() }
    }

    fn check_dim(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.vector_dim {
            return Err(VectorError::DimensionMismatch {
                expected: self.vector_dim,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    fn score(&self, query: &[f32], candidate: &[f32]) -> f64 {
        match self.metric {
            Metric::Cosine => cosine_similarity(query, candidate),
            Metric::L2 => l2_distance(query, candidate),
        }
    }

    /// `true` if `score` clears `threshold` under this index's metric direction:
    /// cosine wants `score >= threshold`, L2 wants `score <= threshold`.
    fn passes_threshold(&self, score: f64, threshold: Option<f64>) -> bool {
        match (self.metric, threshold) {
            (_, None) => true,
            (Metric::Cosine, Some(t)) => score >= t,
            (Metric::L2, Some(t)) => score <= t,
        }
    }

    fn better(&self, a: f64, b: f64) -> Ordering {
        match self.metric {
            // Cosine: higher is better.
            Metric::Cosine => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
            // L2: lower is better.
            Metric::L2 => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        }
    }
}

impl Index for FlatIndex {
    fn add(&mut self, oid: Oid, vector: Vec<f32>) -> Result<(), VectorError> {
        self.check_dim(&vector)?;
        self.entries.insert(oid, vector);
        Ok(())
    }

    fn update(&mut self, oid: &str, vector: Vec<f32>) -> Result<(), VectorError> {
        self.check_dim(&vector)?;
        self.entries.insert(oid.to_string(), vector);
        Ok(())
    }

    fn remove(&mut self, oid: &str) -> bool {
        self.entries.remove(oid).is_some()
    }

    fn get(&self, oid: &str) -> Option<&[f32]> {
        self.entries.get(oid).map(|v| v.as_slice())
    }

    fn search(&self, query: &[f32], k: usize, threshold: Option<f64>) -> Vec<Hit> {
        if k == 0 || self.entries.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<Hit> = self
            .entries
            .iter()
            .map(|(oid, vec)| Hit { oid: oid.clone(), score: self.score(query, vec) })
            .filter(|hit| self.passes_threshold(hit.score, threshold))
            .collect();

        scored.sort_by(|a, b| match self.better(a.score, b.score) {
            Ordering::Equal => a.oid.cmp(&b.oid),
            ord => ord,
        });
        scored.truncate(k);
        scored
    }

    fn size(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn vector_dim(&self) -> usize {
        self.vector_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> FlatIndex {
        let mut idx = FlatIndex::new(Metric::Cosine, 2);
        idx.add("b".into(), vec![1.0, 0.0]).unwrap();
        idx.add("a".into(), vec![1.0, 0.0]).unwrap();
        idx.add("c".into(), vec![0.0, 1.0]).unwrap();
        idx
    }

    #[test]
    fn wrong_dimension_put_fails() {
        let mut idx = FlatIndex::new(Metric::Cosine, 4);
        let err = idx.add("x".into(), vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, VectorError::DimensionMismatch { expected: 4, actual: 2 }));
    }

    #[test]
    fn search_on_empty_index_returns_empty() {
        let idx = FlatIndex::new(Metric::Cosine, 3);
        assert_eq!(idx.search(&[1.0, 0.0, 0.0], 5, None), Vec::new());
    }

    #[test]
    fn k_zero_returns_empty() {
        let idx = sample_index();
        assert_eq!(idx.search(&[1.0, 0.0], 0, None), Vec::new());
    }

    #[test]
    fn ties_broken_by_oid_lexicographic_order() {
        let idx = sample_index();
        let hits = idx.search(&[1.0, 0.0], 2, None);
        assert_eq!(hits[0].oid, "a");
        assert_eq!(hits[1].oid, "b");
    }

    #[test]
    fn k_greater_than_size_returns_at_most_size_entries() {
        let idx = sample_index();
        let hits = idx.search(&[1.0, 0.0], 100, None);
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn threshold_filters_cosine_results() {
        let idx = sample_index();
        let hits = idx.search(&[1.0, 0.0], 10, Some(0.99));
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.oid != "c"));
    }

    #[test]
    fn zero_vector_query_yields_no_candidates_above_threshold() {
        let idx = sample_index();
        let hits = idx.search(&[0.0, 0.0], 10, Some(0.1));
        assert!(hits.is_empty());
    }

    #[test]
    fn remove_unknown_oid_is_a_no_op() {
        let mut idx = sample_index();
        assert!(!idx.remove("does-not-exist"));
        assert_eq!(idx.size(), 3);
    }

    #[test]
    fn l2_orders_ascending_by_distance() {
        let mut idx = FlatIndex::new(Metric::L2, 1);
        idx.add("far".into(), vec![10.0]).unwrap();
        idx.add("near".into(), vec![1.0]).unwrap();
        let hits = idx.search(&[0.0], 2, None);
        assert_eq!(hits[0].oid, "near");
        assert_eq!(hits[1].oid, "far");
    }
}
