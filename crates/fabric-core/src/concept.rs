//! The concept data model: the record that flows through every tier of the fabric.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, stable object identifier. Assigned at creation, immutable thereafter.
pub type Oid = String;

/// Generate a fresh OID. Concepts created without a caller-supplied id get one of these.
pub fn new_oid() -> Oid {
    uuid::Uuid::new_v4().to_string()
}

/// An application-defined metadata value. Scalars and homogeneous-enough lists;
/// deliberately not a full JSON value, since metadata here is sidecar data, not content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetadataValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<MetadataValue>),
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

pub type Metadata = HashMap<String, MetadataValue>;

/// Directional relations: relation-kind -> ordered list of target OIDs.
/// The inverse edge is never materialized.
pub type Relations = HashMap<String, Vec<Oid>>;

/// Confidence score clamped to [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Confidence(f64);

impl Confidence {
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self(1.0)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

impl From<f64> for Confidence {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(c: Confidence) -> Self {
        c.0
    }
}

/// The entity flowing through every tier: L1, L2, and L3 all key on `oid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub oid: Oid,
    /// High-dimensional symbolic vector. Optional at L1/L2 — those tiers may cache
    /// only the geometric embedding.
    pub symbolic_vector: Option<Vec<f32>>,
    /// The vector indexed by the ANN tiers.
    pub geometric_embedding: Vec<f32>,
    pub metadata: Metadata,
    pub relations: Relations,
    pub confidence: Confidence,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Concept {
    /// Build a new concept with a freshly generated OID and `created_at == updated_at`.
    pub fn new(geometric_embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            oid: new_oid(),
            symbolic_vector: None,
            geometric_embedding,
            metadata: Metadata::new(),
            relations: Relations::new(),
            confidence: Confidence::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a diff in place, bumping `updated_at`. Does not touch `oid` or `created_at`.
    pub fn apply_diff(&mut self, diff: &ConceptDiff) {
        if let Some(v) = &diff.symbolic_vector {
            self.symbolic_vector = Some(v.clone());
        }
        if let Some(v) = &diff.geometric_embedding {
            self.geometric_embedding = v.clone();
        }
        for (k, v) in &diff.metadata_set {
            self.metadata.insert(k.clone(), v.clone());
        }
        for k in &diff.metadata_remove {
            self.metadata.remove(k);
        }
        for (kind, targets) in &diff.relations_set {
            self.relations.insert(kind.clone(), targets.clone());
        }
        if let Some(c) = diff.confidence {
            self.confidence = c;
        }
        self.updated_at = Utc::now();
    }
}

impl PartialEq for Concept {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid
    }
}

/// A partial update to a concept. Unset fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConceptDiff {
    pub symbolic_vector: Option<Vec<f32>>,
    pub geometric_embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata_set: Metadata,
    #[serde(default)]
    pub metadata_remove: Vec<String>,
    #[serde(default)]
    pub relations_set: Relations,
    pub confidence: Option<Confidence>,
}

impl ConceptDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata_set.insert(key.into(), value.into());
        self
    }
}
