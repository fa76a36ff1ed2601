use fabric_core::{Concept, Oid};

/// Which tier served a read. A cache-tier hit is lifted one tier closer to L1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    L1,
    L2,
    L3,
}

/// One hit from `Fabric::semantic_search`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub oid: Oid,
    pub similarity: f64,
    pub tier: Tier,
}

/// The result of `Fabric::get_concept`: the concept plus which tier served it.
/// Only an `L3`-served read carries the authoritative `created_at`/`updated_at`
/// and `relations` — L1 and L2 cache only the embedding and metadata snapshot,
/// so a cache-tier hit fills those fields with placeholders rather than stale
/// or fabricated ground truth.
#[derive(Debug, Clone)]
pub struct ConceptLookup {
    pub concept: Concept,
    pub tier: Tier,
}
