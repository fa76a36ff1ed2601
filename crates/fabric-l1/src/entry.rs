use chrono::{DateTime, Utc};
use fabric_core::Metadata;

/// A single L1-resident entry: embedding + metadata snapshot plus the access
/// telemetry the eviction and promotion policies both read.
#[derive(Debug, Clone)]
pub struct L1Entry {
    pub geometric_embedding: Vec<f32>,
    pub metadata: Metadata,
    pub access_count: u64,
    pub last_access_time: DateTime<Utc>,
    pub insert_time: DateTime<Utc>,
    /// Set once this entry has crossed its promotion threshold and is sitting in
    /// (or waiting to re-enter) the promotion buffer. Pinned entries are skipped
    /// by eviction.
    pub promotion_pending: bool,
    /// The `access_count` this entry must cross to trigger its next promotion.
    /// Starts at `l1.promotion_threshold`; raised by `l1.promotion_requeue_step`
    /// every time it fires, so a hot entry doesn't re-flap into the queue.
    pub next_promotion_threshold: u32,
}

impl L1Entry {
    pub fn new(geometric_embedding: Vec<f32>, metadata: Metadata, promotion_threshold: u32) -> Self {
        let now = Utc::now();
        Self {
            geometric_embedding,
            metadata,
            access_count: 0,
            last_access_time: now,
            insert_time: now,
            promotion_pending: false,
            next_promotion_threshold: promotion_threshold,
        }
    }
}
