use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use fabric_core::config::PromotionConfig;
use fabric_core::errors::PromotionFailureReason;
use fabric_core::Oid;
use fabric_l1::L1Cache;
use fabric_l2::L2Cache;

use crate::coordinator::{ApplyPutError, CacheCoordinator};

#[derive(Debug, Clone)]
pub struct PromotionFailure {
    pub oid: Oid,
    pub reason: PromotionFailureReason,
}

/// Shape returned by one promotion cycle.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PromotionResult {
    pub success: bool,
    pub promoted: usize,
    pub promoted_oids: Vec<Oid>,
    pub requeued: usize,
    pub failures: Vec<PromotionFailureEntry>,
    pub failure_reasons: HashMap<String, u64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PromotionFailureEntry {
    pub oid: Oid,
    pub reason: String,
}

/// Drains L1's promotion buffer into L2, with rollback-to-L1 on failure. Can run
/// one-shot (`run_once`) or as a background daemon (`spawn_daemon`) on its own
/// `interval_seconds` cadence, the same interval-driven-batch-worker shape the
/// workspace uses for its re-embedding migration worker, generalized to this
/// pipeline's promote-on-a-timer need.
pub struct PromotionPipeline {
    l1: Arc<L1Cache>,
    l2: Arc<L2Cache>,
    coordinator: Option<Arc<CacheCoordinator>>,
    config: PromotionConfig,
}

impl PromotionPipeline {
    pub fn new(
        l1: Arc<L1Cache>,
        l2: Arc<L2Cache>,
        coordinator: Option<Arc<CacheCoordinator>>,
        config: PromotionConfig,
    ) -> Self {
        Self { l1, l2, coordinator, config }
    }

    /// Run a single promotion cycle over up to `config.batch_limit` candidates.
    pub fn run_once(&self) -> PromotionResult {
        self.run_once_with_limit(self.config.batch_limit)
    }

    /// Run a single promotion cycle with an explicit batch size, overriding
    /// `config.batch_limit` (the façade's `promote_l1_candidates(explicit_batch)`).
    pub fn run_once_with_limit(&self, limit: usize) -> PromotionResult {
        let candidates = self.l1.drain_promotions(limit);
        let mut result = PromotionResult { success: true, ..Default::default() };

        for oid in candidates {
            match self.promote_one(&oid) {
                Ok(()) => {
                    self.l1.mark_promoted(&oid);
                    result.promoted += 1;
                    result.promoted_oids.push(oid);
                }
                Err(reason) => {
                    result.success = false;
                    self.l1.requeue_promotion(&oid);
                    result.requeued += 1;
                    *result.failure_reasons.entry(reason.as_key().to_string()).or_insert(0) += 1;
                    result.failures.push(PromotionFailureEntry { oid, reason: reason.as_key().to_string() });
                }
            }
        }
        result
    }

    fn promote_one(&self, oid: &str) -> Result<(), PromotionFailureReason> {
        let Some(entry) = self.l1.peek(oid) else {
            return Err(PromotionFailureReason::MissingVector);
        };
        if entry.geometric_embedding.is_empty() {
            return Err(PromotionFailureReason::MissingVector);
        }
        let vector = entry.geometric_embedding.clone();
        let metadata = if self.config.include_vectors { entry.metadata.clone() } else { Default::default() };

        if self.config.notify_coordinator {
            let Some(coordinator) = &self.coordinator else {
                return Err(PromotionFailureReason::CoordinatorPutRejected);
            };
            return coordinator.apply_put(&oid.to_string(), vector, metadata).map_err(|e| match e {
                ApplyPutError::Rejected => PromotionFailureReason::CoordinatorPutRejected,
                ApplyPutError::Failed(_) => PromotionFailureReason::CoordinatorPutFailed,
            });
        }

        self.l2
            .put(oid, vector, metadata)
            .map_err(|_| PromotionFailureReason::L2PutFailed)
    }

    /// Spawn the interval-driven daemon thread. Returns a handle bundling the
    /// stop flag and the `JoinHandle`; dropping the handle leaves the daemon
    /// running — callers must explicitly `stop()` it.
    pub fn spawn_daemon(self: Arc<Self>) -> PromotionDaemonHandle {
        let run_flag = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&run_flag);
        let interval = Duration::from_secs(self.config.interval_seconds.max(1));
        let idle = Duration::from_secs(self.config.idle_sleep_seconds.max(1));
        let pipeline = Arc::clone(&self);
        let handle = std::thread::spawn(move || {
            while flag.load(Ordering::SeqCst) {
                let result = pipeline.run_once();
                if result.promoted == 0 && result.requeued == 0 {
                    std::thread::sleep(idle);
                } else {
                    std::thread::sleep(interval);
                }
            }
        });
        PromotionDaemonHandle { run_flag, handle: Mutex::new(Some(handle)) }
    }
}

pub struct PromotionDaemonHandle {
    run_flag: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PromotionDaemonHandle {
    pub fn stop(&self) {
        self.run_flag.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_core::config::{L1Config, L2Config};
    use fabric_core::Metadata;

    fn l1_config() -> L1Config {
        L1Config {
            max_size: 10,
            vector_dim: 2,
            promotion_threshold: 2,
            promotion_requeue_step: 1,
            ..Default::default()
        }
    }

    fn l2_config() -> L2Config {
        L2Config { storage_path: String::new(), max_size: 10, vector_dim: 2, ..Default::default() }
    }

    #[test]
    fn promotes_a_hot_entry_into_l2() {
        let l1 = Arc::new(L1Cache::new(l1_config()));
        let l2 = Arc::new(L2Cache::open_in_memory(l2_config()).unwrap());
        l1.put("concept/promote".into(), vec![0.1, 0.2], Metadata::new()).unwrap();
        l1.get("concept/promote");
        l1.get("concept/promote");

        let pipeline = PromotionPipeline::new(Arc::clone(&l1), Arc::clone(&l2), None, PromotionConfig { notify_coordinator: false, ..Default::default() });
        let result = pipeline.run_once();
        assert!(result.success);
        assert_eq!(result.promoted, 1);
        assert_eq!(result.promoted_oids, vec!["concept/promote".to_string()]);
        assert!(l2.get("concept/promote").unwrap().is_some());
    }

    #[test]
    fn missing_vector_is_recorded_as_a_failure_and_requeued() {
        let l1 = Arc::new(L1Cache::new(l1_config()));
        let l2 = Arc::new(L2Cache::open_in_memory(l2_config()).unwrap());
        // Put then remove so the promotion candidate's OID is no longer resolvable,
        // simulating the candidate disappearing from L1 before promotion runs.
        l1.put("ghost".into(), vec![0.1, 0.2], Metadata::new()).unwrap();
        l1.get("ghost");
        l1.get("ghost");
        l1.remove("ghost");

        let pipeline = PromotionPipeline::new(l1, l2, None, PromotionConfig { notify_coordinator: false, ..Default::default() });
        let result = pipeline.run_once();
        assert!(!result.success);
        assert_eq!(result.failure_reasons.get("missing_vector"), Some(&1));
    }

    #[test]
    fn notify_coordinator_without_a_coordinator_is_rejected() {
        let l1 = Arc::new(L1Cache::new(l1_config()));
        let l2 = Arc::new(L2Cache::open_in_memory(l2_config()).unwrap());
        l1.put("p".into(), vec![0.1, 0.2], Metadata::new()).unwrap();
        l1.get("p");
        l1.get("p");

        let pipeline = PromotionPipeline::new(l1.clone(), l2, None, PromotionConfig { notify_coordinator: true, ..Default::default() });
        let result = pipeline.run_once();
        assert!(!result.success);
        assert_eq!(result.failure_reasons.get("coordinator_put_rejected"), Some(&1));
        assert!(l1.peek_promotions().contains(&"p".to_string()));
    }
}
