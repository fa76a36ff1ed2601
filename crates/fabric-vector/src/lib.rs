//! Vector store primitives: a similarity-search `Index` abstraction and a
//! flat, exact implementation. L1 and L2 each embed the same scoring/tie-break/ordering
//! contract this module defines (cosine or L2, OID lexicographic tie-break) directly
//! against their own storage (a `DashMap` for L1, a SQLite table for L2), since neither
//! tier's storage is a bare vector map; `FlatIndex` is the standalone reference
//! implementation of that contract for callers that just need an in-memory index.

mod flat;
mod similarity;

pub use flat::FlatIndex;
pub use similarity::{cosine_similarity, l2_distance, Metric};

use fabric_core::errors::VectorError;
use fabric_core::Oid;

/// A single search hit: the OID and its similarity/distance under the index's metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub oid: Oid,
    pub score: f64,
}

/// The vector index abstraction every cache tier is built on.
///
/// Implementations must be deterministic for equal inputs under the same
/// configuration: ties in score are broken by OID lexicographic order, and
/// `search` never returns an OID absent from the index.
pub trait Index: Send + Sync {
    fn add(&mut self, oid: Oid, vector: Vec<f32>) -> Result<(), VectorError>;
    fn update(&mut self, oid: &str, vector: Vec<f32>) -> Result<(), VectorError>;
    /// Returns `true` if an entry was removed, `false` if the OID was absent.
    fn remove(&mut self, oid: &str) -> bool;
    fn get(&self, oid: &str) -> Option<&[f32]>;
    fn search(&self, query: &[f32], k: usize, threshold: Option<f64>) -> Vec<Hit>;
    fn size(&self) -> usize;
    fn clear(&mut self);
    fn vector_dim(&self) -> usize;
}
