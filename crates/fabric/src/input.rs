use fabric_core::{Confidence, Metadata, Relations};

/// Caller-supplied fields for `Fabric::create_concept`. The OID, `created_at`,
/// and `updated_at` are always assigned by the store, never by the caller.
#[derive(Debug, Clone, Default)]
pub struct NewConcept {
    pub geometric_embedding: Vec<f32>,
    pub symbolic_vector: Option<Vec<f32>>,
    pub metadata: Metadata,
    pub relations: Relations,
    pub confidence: Option<Confidence>,
}

impl NewConcept {
    pub fn new(geometric_embedding: Vec<f32>) -> Self {
        Self { geometric_embedding, ..Default::default() }
    }

    pub fn with_symbolic_vector(mut self, v: Vec<f32>) -> Self {
        self.symbolic_vector = Some(v);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_relations(mut self, relations: Relations) -> Self {
        self.relations = relations;
        self
    }

    pub fn with_confidence(mut self, confidence: impl Into<Confidence>) -> Self {
        self.confidence = Some(confidence.into());
        self
    }
}
