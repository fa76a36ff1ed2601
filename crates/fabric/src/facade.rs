use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use fabric_core::errors::L1Error;
use fabric_core::{Concept, ConceptDiff, Confidence, FabricConfig, FabricResult, Oid, Relations};
use fabric_coordinator::{CacheCoordinator, PromotionDaemonHandle, PromotionPipeline, PromotionResult};
use fabric_l1::{L1Cache, L1Entry};
use fabric_l2::{L2Cache, L2Entry, L2Telemetry};
use fabric_l3::L3Store;
use fabric_outbox::OutboxStore;

use crate::input::NewConcept;
use crate::search::{ConceptLookup, SearchHit, Tier};
use crate::statistics::{CacheStatisticsReport, InvalidateResult, ValidationReport};

/// Composes every tier into the single value a caller constructs once and
/// shares across threads, in place of module-level singletons. A struct owning
/// its sub-components, built by a `new`/`initialize` constructor that wires
/// them in dependency order and logs the result, exposing a composed,
/// cache-then-fallthrough API surface.
pub struct Fabric {
    config: FabricConfig,
    l1: Arc<L1Cache>,
    l2: Arc<L2Cache>,
    l3: Arc<L3Store>,
    outbox: Arc<OutboxStore>,
    coordinator: Arc<CacheCoordinator>,
    promotion: Arc<PromotionPipeline>,
    promotion_daemon: Option<PromotionDaemonHandle>,
    shut_down: AtomicBool,
}

impl Fabric {
    /// Wire every component in dependency order: L3 (and its colocated
    /// outbox) → L2 → L1 → coordinator → promotion daemon. Any failure after
    /// L3 opens rolls the already-built components back (flush/close) before
    /// returning, so a caller never holds a half-initialized fabric.
    pub fn initialize(config: FabricConfig) -> FabricResult<Self> {
        config.validate()?;

        let l3 = Arc::new(Self::open_l3(&config)?);
        let outbox = l3.outbox();

        let l2 = match Self::open_l2(&config) {
            Ok(l2) => Arc::new(l2),
            Err(e) => {
                let _ = l3.close();
                return Err(e.into());
            }
        };

        let l1 = Arc::new(L1Cache::new(config.l1.clone()));
        let coordinator =
            CacheCoordinator::new(Arc::clone(&l1), Arc::clone(&l2), Arc::clone(&outbox), config.coordinator.clone());
        if let Err(e) = coordinator.start() {
            let _ = l2.flush();
            let _ = l3.close();
            return Err(e.into());
        }

        let promotion = Arc::new(PromotionPipeline::new(
            Arc::clone(&l1),
            Arc::clone(&l2),
            Some(Arc::clone(&coordinator)),
            config.promotions.clone(),
        ));
        let promotion_daemon = if config.promotions.enabled {
            Some(Arc::clone(&promotion).spawn_daemon())
        } else {
            None
        };

        info!(
            vector_dim = config.l1.vector_dim,
            l1_max_size = config.l1.max_size,
            l2_max_size = config.l2.max_size,
            coordinator_workers = config.coordinator.workers,
            promotion_daemon = promotion_daemon.is_some(),
            "fabric initialized"
        );

        Ok(Self {
            config,
            l1,
            l2,
            l3,
            outbox,
            coordinator,
            promotion,
            promotion_daemon,
            shut_down: AtomicBool::new(false),
        })
    }

    fn open_l3(config: &FabricConfig) -> FabricResult<L3Store> {
        let store = if config.l3.storage_path == ":memory:" {
            L3Store::open_in_memory(config.l3.clone(), config.outbox.clone())
        } else {
            L3Store::open(config.l3.clone(), config.outbox.clone())
        };
        Ok(store?)
    }

    fn open_l2(config: &FabricConfig) -> FabricResult<L2Cache> {
        let cache = if config.l2.storage_path == ":memory:" {
            L2Cache::open_in_memory(config.l2.clone())
        } else {
            L2Cache::open(config.l2.clone())
        };
        Ok(cache?)
    }

    fn check_dim(&self, vector: &[f32]) -> FabricResult<()> {
        if vector.len() != self.config.l1.vector_dim {
            return Err(L1Error::DimensionMismatch { expected: self.config.l1.vector_dim, actual: vector.len() }.into());
        }
        Ok(())
    }

    /// Insert a brand-new concept. Writes through L3 only — L1/L2 pick it up
    /// once the coordinator drains the outbox entry L3's commit enqueued.
    pub fn create_concept(&self, new_concept: NewConcept) -> FabricResult<Oid> {
        self.check_dim(&new_concept.geometric_embedding)?;
        let mut concept = Concept::new(new_concept.geometric_embedding);
        concept.symbolic_vector = new_concept.symbolic_vector;
        concept.metadata = new_concept.metadata;
        concept.relations = new_concept.relations;
        if let Some(confidence) = new_concept.confidence {
            concept.confidence = confidence;
        }
        Ok(self.l3.store_concept(concept)?)
    }

    /// Apply a partial update. Returns `false` (not an error) if the OID
    /// doesn't exist in L3.
    pub fn update_concept(&self, oid: &str, diff: ConceptDiff) -> FabricResult<bool> {
        if let Some(v) = &diff.geometric_embedding {
            self.check_dim(v)?;
        }
        Ok(self.l3.update_concept(oid, &diff)?)
    }

    /// Read a concept with tier-lift semantics: L1 first, then L2, then L3.
    /// A hit one tier down is lifted one tier up before returning.
    pub fn get_concept(&self, oid: &str) -> FabricResult<Option<ConceptLookup>> {
        if let Some(entry) = self.l1.get(oid) {
            return Ok(Some(ConceptLookup { concept: Self::concept_from_l1(oid, entry), tier: Tier::L1 }));
        }

        if let Some(entry) = self.l2.get(oid)? {
            let concept = Self::concept_from_l2(&entry);
            let _ = self.l1.put(oid.to_string(), entry.embedding, entry.metadata);
            return Ok(Some(ConceptLookup { concept, tier: Tier::L2 }));
        }

        if let Some(concept) = self.l3.load_concept(oid)? {
            let _ = self.l2.put(oid, concept.geometric_embedding.clone(), concept.metadata.clone());
            return Ok(Some(ConceptLookup { concept, tier: Tier::L3 }));
        }

        Ok(None)
    }

    fn concept_from_l1(oid: &str, entry: L1Entry) -> Concept {
        Concept {
            oid: oid.to_string(),
            symbolic_vector: None,
            geometric_embedding: entry.geometric_embedding,
            metadata: entry.metadata,
            relations: Relations::new(),
            confidence: Confidence::default(),
            created_at: entry.insert_time,
            updated_at: entry.last_access_time,
        }
    }

    fn concept_from_l2(entry: &L2Entry) -> Concept {
        let now = Utc::now();
        Concept {
            oid: entry.oid.clone(),
            symbolic_vector: None,
            geometric_embedding: entry.embedding.clone(),
            metadata: entry.metadata.clone(),
            relations: Relations::new(),
            confidence: Confidence::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Drop an OID from L1/L2 without touching its L3 row (the gated
    /// coordinator primitive). `l3` in the result reports whether the
    /// ground-truth row still exists, for callers that want to distinguish
    /// "invalidated a live concept" from "invalidated a tombstone".
    pub fn invalidate_concept(&self, oid: &str) -> FabricResult<InvalidateResult> {
        let invalidated = self.coordinator.invalidate(oid)?;
        let l3 = self.l3.load_concept(oid)?.is_some();
        Ok(InvalidateResult { l1: invalidated.l1, l2: invalidated.l2, l3 })
    }

    /// Search L1 first; if fewer than `k` results meet `threshold`, widen into
    /// L2 for the remainder, skipping OIDs L1 already returned.
    pub fn semantic_search(&self, query: &[f32], k: usize, threshold: Option<f64>) -> FabricResult<Vec<SearchHit>> {
        self.check_dim(query)?;
        let mut hits: Vec<SearchHit> = self
            .l1
            .search_similar(query, k, threshold)
            .into_iter()
            .map(|hit| SearchHit { oid: hit.oid, similarity: hit.score, tier: Tier::L1 })
            .collect();

        if hits.len() < k {
            let seen: HashSet<String> = hits.iter().map(|h| h.oid.clone()).collect();
            for hit in self.l2.search_similar(query, k, threshold)? {
                if hits.len() >= k {
                    break;
                }
                if seen.contains(&hit.oid) {
                    continue;
                }
                hits.push(SearchHit { oid: hit.oid, similarity: hit.score, tier: Tier::L2 });
            }
        }
        Ok(hits)
    }

    /// Run one promotion cycle, optionally overriding `promotions.batch_limit`
    /// for this call only. Works whether or not the promotion daemon is
    /// running — the daemon is just this same call on a timer.
    pub fn promote_l1_candidates(&self, explicit_batch: Option<usize>) -> PromotionResult {
        match explicit_batch {
            Some(limit) => self.promotion.run_once_with_limit(limit),
            None => self.promotion.run_once(),
        }
    }

    /// Snapshot every tier's counters. Never fails: a tier that can't answer
    /// contributes its zero value instead of aborting the whole report.
    pub fn get_cache_statistics(&self) -> CacheStatisticsReport {
        CacheStatisticsReport {
            l1: self.l1.get_statistics(),
            l2: self.l2.get_statistics().unwrap_or_default(),
            l3: self.l3.get_statistics().unwrap_or_default(),
            outbox: self.outbox.get_statistics().unwrap_or_default(),
            coordinator: self.coordinator.get_statistics(),
        }
    }

    pub fn get_l2_telemetry(&self) -> L2Telemetry {
        self.l2.get_telemetry()
    }

    /// Structured health report; never raises.
    pub fn validate(&self) -> ValidationReport {
        let mut issues = Vec::new();
        if let Err(e) = self.config.validate() {
            issues.push(e.to_string());
        }
        if self.shut_down.load(Ordering::SeqCst) {
            issues.push("fabric has been shut down".to_string());
        } else {
            if self.l3.is_closed() {
                issues.push("L3 store is closed".to_string());
            }
            if !self.coordinator.is_running() {
                issues.push("cache coordinator is not running".to_string());
            }
        }
        ValidationReport { ok: issues.is_empty(), issues }
    }

    /// Stop the promotion daemon and the coordinator's worker pool (bounded),
    /// then flush L2 and checkpoint L3/outbox. Idempotent: a second call is a
    /// no-op. In-flight outbox entries are left `in_flight` on disk — the next
    /// `reap_timeouts` call returns them to `pending`.
    pub fn shutdown(&self) -> FabricResult<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(handle) = &self.promotion_daemon {
            handle.stop();
        }
        self.coordinator.stop(Duration::from_secs(30))?;
        self.l2.flush()?;
        self.l3.close()?;
        self.outbox.shutdown()?;
        info!("fabric shut down");
        Ok(())
    }

    pub fn l1(&self) -> &Arc<L1Cache> {
        &self.l1
    }

    pub fn l2(&self) -> &Arc<L2Cache> {
        &self.l2
    }

    pub fn l3(&self) -> &Arc<L3Store> {
        &self.l3
    }

    pub fn outbox(&self) -> &Arc<OutboxStore> {
        &self.outbox
    }

    pub fn coordinator(&self) -> &Arc<CacheCoordinator> {
        &self.coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_core::config::{CoordinatorConfig, L1Config, L2Config, L3Config, OutboxConfig, PromotionConfig};

    fn test_config() -> FabricConfig {
        FabricConfig {
            l1: L1Config { max_size: 16, vector_dim: 2, promotion_threshold: 2, promotion_requeue_step: 1, ..Default::default() },
            l2: L2Config { storage_path: ":memory:".to_string(), max_size: 16, vector_dim: 2, ..Default::default() },
            l3: L3Config { storage_path: ":memory:".to_string(), ..Default::default() },
            coordinator: CoordinatorConfig { workers: 1, idle_sleep_seconds: 1, ..Default::default() },
            outbox: OutboxConfig::default(),
            promotions: PromotionConfig { enabled: false, notify_coordinator: false, ..Default::default() },
        }
    }

    fn wait_until<F: Fn() -> bool>(f: F) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !f() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn initialize_then_shutdown_is_idempotent() {
        let fabric = Fabric::initialize(test_config()).unwrap();
        assert!(fabric.validate().ok);
        fabric.shutdown().unwrap();
        fabric.shutdown().unwrap();
        assert!(!fabric.validate().ok);
    }

    #[test]
    fn create_then_get_lifts_from_l3_into_l2() {
        let fabric = Fabric::initialize(test_config()).unwrap();
        let oid = fabric.create_concept(NewConcept::new(vec![1.0, 0.0])).unwrap();

        wait_until(|| fabric.l2().get(&oid).unwrap().is_some());

        let looked_up = fabric.get_concept(&oid).unwrap().unwrap();
        assert_eq!(looked_up.tier, Tier::L2);
        assert_eq!(looked_up.concept.geometric_embedding, vec![1.0, 0.0]);
    }

    #[test]
    fn get_of_unknown_oid_returns_none() {
        let fabric = Fabric::initialize(test_config()).unwrap();
        assert!(fabric.get_concept("nope").unwrap().is_none());
    }

    #[test]
    fn create_concept_with_wrong_dimension_is_rejected() {
        let fabric = Fabric::initialize(test_config()).unwrap();
        let err = fabric.create_concept(NewConcept::new(vec![1.0])).unwrap_err();
        assert!(matches!(err, fabric_core::FabricError::L1(L1Error::DimensionMismatch { expected: 2, actual: 1 })));
    }

    #[test]
    fn invalidate_reports_l3_presence_without_deleting_it() {
        let fabric = Fabric::initialize(test_config()).unwrap();
        let oid = fabric.create_concept(NewConcept::new(vec![1.0, 0.0])).unwrap();
        wait_until(|| fabric.l2().get(&oid).unwrap().is_some());

        let result = fabric.invalidate_concept(&oid).unwrap();
        assert!(result.l2);
        assert!(result.l3);
        assert!(fabric.l3().load_concept(&oid).unwrap().is_some());
    }

    #[test]
    fn promote_l1_candidates_moves_a_hot_entry_into_l2() {
        let fabric = Fabric::initialize(test_config()).unwrap();
        fabric.l1().put("concept/promote".into(), vec![0.1, 0.2], Default::default()).unwrap();
        fabric.l1().get("concept/promote");
        fabric.l1().get("concept/promote");

        let result = fabric.promote_l1_candidates(None);
        assert!(result.success);
        assert_eq!(result.promoted, 1);
        assert!(fabric.l2().get("concept/promote").unwrap().is_some());
    }

    #[test]
    fn semantic_search_widens_from_l1_into_l2() {
        let fabric = Fabric::initialize(test_config()).unwrap();
        fabric.l2().put("only-in-l2", vec![1.0, 0.0], Default::default()).unwrap();
        fabric.l1().put("in-l1".to_string(), vec![0.0, 1.0], Default::default()).unwrap();

        let hits = fabric.semantic_search(&[1.0, 0.0], 2, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().any(|h| h.oid == "only-in-l2" && h.tier == Tier::L2));
        assert!(hits.iter().any(|h| h.oid == "in-l1" && h.tier == Tier::L1));
    }

    #[test]
    fn get_cache_statistics_never_panics_after_shutdown() {
        let fabric = Fabric::initialize(test_config()).unwrap();
        fabric.shutdown().unwrap();
        let stats = fabric.get_cache_statistics();
        assert_eq!(stats.l3.total_concepts, 0);
    }
}
