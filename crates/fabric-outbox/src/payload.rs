//! The write-intent payload carried by every outbox entry.

use fabric_core::{Metadata, Oid};
use serde::{Deserialize, Serialize};

/// What kind of write the intent describes. Drives dispatch in the coordinator worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteIntentKind {
    Created,
    Updated,
    Deleted,
    Invalidated,
}

/// A single write-intent: enough information for a coordinator worker to bring L1/L2
/// into line with an L3 commit, without re-reading L3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteIntent {
    pub kind: WriteIntentKind,
    pub oid: Oid,
    /// Present for `created`/`updated`; absent for `deleted`/`invalidated`.
    pub vector: Option<Vec<f32>>,
    /// Present for `created`/`updated`; absent for `deleted`/`invalidated`.
    pub metadata: Option<Metadata>,
}

impl WriteIntent {
    pub fn created(oid: Oid, vector: Vec<f32>, metadata: Metadata) -> Self {
        Self { kind: WriteIntentKind::Created, oid, vector: Some(vector), metadata: Some(metadata) }
    }

    pub fn updated(oid: Oid, vector: Vec<f32>, metadata: Metadata) -> Self {
        Self { kind: WriteIntentKind::Updated, oid, vector: Some(vector), metadata: Some(metadata) }
    }

    pub fn deleted(oid: Oid) -> Self {
        Self { kind: WriteIntentKind::Deleted, oid, vector: None, metadata: None }
    }

    pub fn invalidated(oid: Oid) -> Self {
        Self { kind: WriteIntentKind::Invalidated, oid, vector: None, metadata: None }
    }
}
