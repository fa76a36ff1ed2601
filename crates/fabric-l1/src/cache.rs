use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use dashmap::DashMap;

use fabric_core::config::L1Config;
use fabric_core::errors::L1Error;
use fabric_core::{Metadata, Oid};
use fabric_vector::{cosine_similarity, Hit};

use crate::entry::L1Entry;
use crate::eviction::{choose_evictions, Candidate};
use crate::statistics::L1Statistics;

/// The L1 working-set cache: in-memory ANN + access stats, hybrid
/// LFU/LRU eviction, and the hot-entry promotion queue the promotion pipeline
/// (`fabric-coordinator`) drains.
///
/// `DashMap` gives per-shard locking so concurrent `get`/`put` from different OIDs
/// don't serialize on a single mutex.
pub struct L1Cache {
    config: L1Config,
    entries: DashMap<Oid, L1Entry>,
    promotion_queue: Mutex<VecDeque<Oid>>,
    total_puts: AtomicU64,
    total_gets: AtomicU64,
    total_evictions: AtomicU64,
    total_promotions_triggered: AtomicU64,
}

impl L1Cache {
    pub fn new(config: L1Config) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            promotion_queue: Mutex::new(VecDeque::new()),
            total_puts: AtomicU64::new(0),
            total_gets: AtomicU64::new(0),
            total_evictions: AtomicU64::new(0),
            total_promotions_triggered: AtomicU64::new(0),
        }
    }

    fn check_dim(&self, vector: &[f32]) -> Result<(), L1Error> {
        if vector.len() != self.config.vector_dim {
            return Err(L1Error::DimensionMismatch {
                expected: self.config.vector_dim,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Insert or overwrite an entry. Triggers eviction if the resulting size meets
    /// `eviction_threshold * max_size`.
    pub fn put(&self, oid: Oid, vector: Vec<f32>, metadata: Metadata) -> Result<(), L1Error> {
        self.check_dim(&vector)?;
        self.entries.insert(
            oid,
            L1Entry::new(vector, metadata, self.config.promotion_threshold),
        );
        self.total_puts.fetch_add(1, Ordering::Relaxed);
        self.maybe_evict();
        Ok(())
    }

    /// Read an entry, bumping its access telemetry and — if it crosses its next
    /// promotion threshold — queuing it for promotion.
    pub fn get(&self, oid: &str) -> Option<L1Entry> {
        self.total_gets.fetch_add(1, Ordering::Relaxed);
        let mut entry = self.entries.get_mut(oid)?;
        entry.access_count += 1;
        entry.last_access_time = Utc::now();

        if !entry.promotion_pending
            && entry.access_count >= entry.next_promotion_threshold as u64
        {
            entry.promotion_pending = true;
            entry.next_promotion_threshold =
                entry.next_promotion_threshold.saturating_add(self.config.promotion_requeue_step);
            drop(entry);
            self.promotion_queue.lock().unwrap().push_back(oid.to_string());
            self.total_promotions_triggered.fetch_add(1, Ordering::Relaxed);
            return self.entries.get(oid).map(|e| e.clone());
        }
        Some(entry.clone())
    }

    /// Read an entry without bumping access telemetry or the promotion queue. Used
    /// by the promotion pipeline to inspect a candidate's current vector/metadata
    /// without feeding back into the very statistics that triggered promotion.
    pub fn peek(&self, oid: &str) -> Option<L1Entry> {
        self.entries.get(oid).map(|e| e.clone())
    }

    /// Remove an entry. Returns `false` (not an error) if the OID was absent.
    pub fn remove(&self, oid: &str) -> bool {
        self.entries.remove(oid).is_some()
    }

    pub fn search_similar(&self, query: &[f32], k: usize, threshold: Option<f64>) -> Vec<Hit> {
        if k == 0 || self.entries.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<Hit> = self
            .entries
            .iter()
            .map(|entry| Hit {
                oid: entry.key().clone(),
                score: cosine_similarity(query, &entry.value().geometric_embedding),
            })
            .filter(|hit| threshold.map_or(true, |t| hit.score >= t))
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.oid.cmp(&b.oid)));
        scored.truncate(k);
        scored
    }

    /// Current promotion buffer contents without draining it.
    pub fn peek_promotions(&self) -> Vec<Oid> {
        self.promotion_queue.lock().unwrap().iter().cloned().collect()
    }

    /// Drain up to `limit` OIDs from the front of the promotion buffer, handing
    /// ownership of the decision to the caller (the promotion pipeline). Entries
    /// stay pinned (`promotion_pending`) until `mark_promoted` or `requeue_promotion`
    /// is called.
    pub fn drain_promotions(&self, limit: usize) -> Vec<Oid> {
        let mut queue = self.promotion_queue.lock().unwrap();
        let n = limit.min(queue.len());
        queue.drain(..n).collect()
    }

    /// Called by the promotion pipeline after a candidate lands successfully in L2.
    pub fn mark_promoted(&self, oid: &str) {
        if let Some(mut entry) = self.entries.get_mut(oid) {
            entry.promotion_pending = false;
        }
    }

    /// Called by the promotion pipeline when a candidate fails to land in L2
    /// Resets `access_count` to `threshold - requeue_step` and pushes the
    /// OID back onto the promotion buffer so it is still reachable via
    /// `peek_promotions`.
    pub fn requeue_promotion(&self, oid: &str) {
        if let Some(mut entry) = self.entries.get_mut(oid) {
            entry.access_count = (self.config.promotion_threshold as u64)
                .saturating_sub(self.config.promotion_requeue_step as u64);
            entry.promotion_pending = true;
            drop(entry);
            self.promotion_queue.lock().unwrap().push_back(oid.to_string());
        }
    }

    pub fn get_statistics(&self) -> L1Statistics {
        L1Statistics {
            size: self.entries.len(),
            max_size: self.config.max_size,
            promotion_queue_len: self.promotion_queue.lock().unwrap().len(),
            total_puts: self.total_puts.load(Ordering::Relaxed),
            total_gets: self.total_gets.load(Ordering::Relaxed),
            total_evictions: self.total_evictions.load(Ordering::Relaxed),
            total_promotions_triggered: self.total_promotions_triggered.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.promotion_queue.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn maybe_evict(&self) {
        let max_size = self.config.max_size as f64;
        let high_water = (self.config.eviction_threshold * max_size) as usize;
        if self.entries.len() < high_water {
            return;
        }
        let low_water = (self.config.eviction_low_water_mark * max_size) as usize;
        let candidates: Vec<Candidate> = self
            .entries
            .iter()
            .map(|entry| Candidate {
                oid: entry.key().clone(),
                access_count: entry.value().access_count,
                last_access_time: entry.value().last_access_time,
                pinned: entry.value().promotion_pending,
            })
            .collect();
        let to_evict = choose_evictions(&candidates, self.config.lfu_lru_alpha, low_water);
        let evicted = to_evict.len() as u64;
        for oid in to_evict {
            self.entries.remove(&oid);
        }
        self.total_evictions.fetch_add(evicted, Ordering::Relaxed);
        if evicted == 0 {
            tracing::debug!(size = self.entries.len(), "L1 eviction pass found nothing evictable (all entries pinned)");
        }
    }
}
