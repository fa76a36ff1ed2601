use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use fabric_core::config::CoordinatorConfig;
use fabric_core::errors::CoordinatorError;
use fabric_core::Oid;
use fabric_l1::L1Cache;
use fabric_l2::L2Cache;
use fabric_outbox::{OutboxEntry, OutboxStore, WriteIntentKind};

use crate::state::CoordinatorState;
use crate::statistics::CoordinatorStatistics;

/// Result of gated tier invalidation: which tiers actually held something to
/// drop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationResult {
    pub l1: bool,
    pub l2: bool,
}

/// Why `apply_put` didn't land (`coordinator_put_rejected` /
/// `coordinator_put_failed` failure reasons).
#[derive(Debug, Clone)]
pub enum ApplyPutError {
    /// The coordinator wasn't running and couldn't auto-restart.
    Rejected,
    /// The coordinator ran the put, but the L2 write itself failed.
    Failed(String),
}

/// Supervised worker pool draining the outbox into L1/L2. Workers are
/// plain `std::thread`s running explicit blocking operations, not
/// cooperative scheduling, hash-partitioned over the outbox so per-OID ordering is
/// preserved without a per-OID lock (`fabric_outbox::OutboxStore::reserve_pending_partitioned`).
pub struct CacheCoordinator {
    l1: Arc<L1Cache>,
    l2: Arc<L2Cache>,
    outbox: Arc<OutboxStore>,
    config: CoordinatorConfig,
    state: Mutex<CoordinatorState>,
    stopped_explicitly: AtomicBool,
    run_flag: Arc<AtomicBool>,
    alive_workers: Arc<AtomicUsize>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    total_processed: AtomicU64,
    total_failed: AtomicU64,
    total_dlq: AtomicU64,
}

impl CacheCoordinator {
    pub fn new(l1: Arc<L1Cache>, l2: Arc<L2Cache>, outbox: Arc<OutboxStore>, config: CoordinatorConfig) -> Arc<Self> {
        Arc::new(Self {
            l1,
            l2,
            outbox,
            config,
            state: Mutex::new(CoordinatorState::Stopped),
            stopped_explicitly: AtomicBool::new(false),
            run_flag: Arc::new(AtomicBool::new(false)),
            alive_workers: Arc::new(AtomicUsize::new(0)),
            handles: Mutex::new(Vec::new()),
            total_processed: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
            total_dlq: AtomicU64::new(0),
        })
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.lock().unwrap()
    }

    pub fn is_running(&self) -> bool {
        self.state() == CoordinatorState::Running
    }

    /// Start the worker pool. Fails with `AlreadyRunning` if already running.
    pub fn start(self: &Arc<Self>) -> Result<(), CoordinatorError> {
        let mut state = self.state.lock().unwrap();
        if *state == CoordinatorState::Running {
            return Err(CoordinatorError::AlreadyRunning);
        }
        self.run_flag.store(true, Ordering::SeqCst);
        self.stopped_explicitly.store(false, Ordering::SeqCst);
        self.alive_workers.store(self.config.workers, Ordering::SeqCst);

        let mut handles = self.handles.lock().unwrap();
        handles.clear();
        for worker_index in 0..self.config.workers {
            let coordinator = Arc::clone(self);
            let run_flag = Arc::clone(&self.run_flag);
            let alive = Arc::clone(&self.alive_workers);
            let partition_count = self.config.workers;
            handles.push(std::thread::spawn(move || {
                coordinator.worker_loop(run_flag, worker_index, partition_count);
                alive.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        *state = CoordinatorState::Running;
        Ok(())
    }

    /// Signal every worker to exit and wait (bounded) for them to drain. Marks the
    /// stop explicit, which suppresses auto-restart until the next `start()`.
    pub fn stop(&self, deadline: Duration) -> Result<(), CoordinatorError> {
        self.run_flag.store(false, Ordering::SeqCst);
        self.stopped_explicitly.store(true, Ordering::SeqCst);

        let start = Instant::now();
        while self.alive_workers.load(Ordering::SeqCst) > 0 {
            if start.elapsed() >= deadline {
                return Err(CoordinatorError::ShutdownTimedOut);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        for handle in self.handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
        *self.state.lock().unwrap() = CoordinatorState::Stopped;
        Ok(())
    }

    /// Test-only: simulate the worker pool crashing (panic, fatal dispatch error)
    /// rather than an administrative stop. Waits for the current pool to actually
    /// drain before flipping the state, so a subsequent auto-restart doesn't race
    /// against threads from the crashed pool.
    pub fn simulate_crash(&self) {
        self.run_flag.store(false, Ordering::SeqCst);
        self.stopped_explicitly.store(false, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.alive_workers.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        for handle in self.handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
        *self.state.lock().unwrap() = CoordinatorState::Crashed;
    }

    /// Gate for any public operation that must not proceed while stopped (spec
    /// §4.6, "Operation gating"). Auto-restarts if permitted; otherwise fails.
    fn ensure_running(self: &Arc<Self>) -> Result<(), CoordinatorError> {
        if self.is_running() {
            return Ok(());
        }
        let stopped_explicitly = self.stopped_explicitly.load(Ordering::SeqCst);
        if !stopped_explicitly && self.config.auto_restart {
            self.start()?;
            return Ok(());
        }
        Err(CoordinatorError::CoordinatorStopped)
    }

    /// Drop an OID from whichever tiers are enabled. This is the gated primitive
    /// the fabric façade's `invalidate_concept` calls before also clearing L3's
    /// authoritative row.
    pub fn invalidate(self: &Arc<Self>, oid: &str) -> Result<InvalidationResult, CoordinatorError> {
        self.ensure_running()?;
        let l1 = if self.config.enable_l1 { self.l1.remove(oid) } else { false };
        let l2 = if self.config.enable_l2 { self.l2.remove(oid).unwrap_or(false) } else { false };
        Ok(InvalidationResult { l1, l2 })
    }

    /// Apply a `created`/`updated` write-intent directly to L2 (used by the
    /// promotion pipeline when `notify_coordinator = true`). Distinguishes
    /// "rejected" (coordinator not running, no auto-restart available) from "failed"
    /// (coordinator ran the put, but L2 itself returned an error) so the promotion
    /// pipeline can attribute the right failure reason.
    pub fn apply_put(self: &Arc<Self>, oid: &Oid, vector: Vec<f32>, metadata: fabric_core::Metadata) -> Result<(), ApplyPutError> {
        if self.ensure_running().is_err() {
            return Err(ApplyPutError::Rejected);
        }
        if self.config.enable_l2 {
            self.l2.put(oid, vector, metadata).map_err(|e| ApplyPutError::Failed(e.to_string()))?;
        }
        Ok(())
    }

    pub fn get_statistics(&self) -> CoordinatorStatistics {
        CoordinatorStatistics {
            state: CoordinatorStatistics::state_label(self.state()),
            workers: self.config.workers,
            total_processed: self.total_processed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            total_dlq: self.total_dlq.load(Ordering::Relaxed),
        }
    }

    fn worker_loop(self: Arc<Self>, run_flag: Arc<AtomicBool>, worker_index: usize, partition_count: usize) {
        while run_flag.load(Ordering::SeqCst) {
            let batch = match self.outbox.reserve_pending_partitioned(
                self.config.workers.max(1),
                partition_count,
                worker_index,
            ) {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(worker_index, error = %e, "outbox reservation failed, backing off");
                    std::thread::sleep(Duration::from_secs(self.config.idle_sleep_seconds));
                    continue;
                }
            };

            if batch.is_empty() {
                std::thread::sleep(Duration::from_secs(self.config.idle_sleep_seconds));
                continue;
            }

            for entry in batch {
                self.process_entry(entry);
            }
        }
    }

    fn process_entry(&self, entry: OutboxEntry) {
        let oid = entry.payload.oid.clone();
        let outcome = self.dispatch(&entry);
        match outcome {
            Ok(()) => {
                if let Err(e) = self.outbox.mark_processed(entry.id) {
                    tracing::warn!(id = entry.id, oid, error = %e, "failed to mark outbox entry processed");
                }
                self.total_processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(reason) => {
                self.total_failed.fetch_add(1, Ordering::Relaxed);
                match self.outbox.mark_failed(entry.id, &reason) {
                    Ok(true) => {
                        self.total_dlq.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(id = entry.id, oid, reason, "entry moved to dead-letter queue");
                    }
                    Ok(false) => {
                        tracing::debug!(id = entry.id, oid, reason, "entry requeued after dispatch failure");
                    }
                    Err(e) => {
                        tracing::warn!(id = entry.id, oid, error = %e, "failed to record dispatch failure");
                    }
                }
            }
        }
    }

    /// Apply one write-intent to L2 then L1: outbox enqueue, coordinator worker
    /// drains, L2 update, then L1 invalidate or update. Returns an error string
    /// (the failure reason) on retriable failure.
    fn dispatch(&self, entry: &OutboxEntry) -> Result<(), String> {
        let oid = &entry.payload.oid;
        match entry.payload.kind {
            WriteIntentKind::Created | WriteIntentKind::Updated => {
                let (Some(vector), Some(metadata)) = (entry.payload.vector.clone(), entry.payload.metadata.clone()) else {
                    return Err("write-intent missing vector or metadata".to_string());
                };
                if self.config.enable_l2 {
                    self.l2.put(oid, vector, metadata).map_err(|e| e.to_string())?;
                }
                if self.config.enable_l1 {
                    self.l1.remove(oid);
                }
                Ok(())
            }
            WriteIntentKind::Deleted | WriteIntentKind::Invalidated => {
                if self.config.enable_l2 {
                    self.l2.remove(oid).map_err(|e| e.to_string())?;
                }
                if self.config.enable_l1 {
                    self.l1.remove(oid);
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_core::config::{L1Config, L2Config, OutboxConfig};
    use fabric_outbox::WriteIntent;

    fn coordinator(config: CoordinatorConfig) -> Arc<CacheCoordinator> {
        let l1 = Arc::new(L1Cache::new(L1Config { vector_dim: 2, ..Default::default() }));
        let l2 = Arc::new(L2Cache::open_in_memory(L2Config { storage_path: String::new(), vector_dim: 2, ..Default::default() }).unwrap());
        let outbox = Arc::new(OutboxStore::open_in_memory(OutboxConfig::default()).unwrap());
        CacheCoordinator::new(l1, l2, outbox, config)
    }

    #[test]
    fn crash_then_auto_restart_on_next_gated_call() {
        let c = coordinator(CoordinatorConfig {
            workers: 1,
            auto_restart: true,
            enable_l1: false,
            enable_l2: false,
            enable_l3: false,
            idle_sleep_seconds: 1,
        });
        c.start().unwrap();
        assert!(c.is_running());

        c.simulate_crash();
        assert!(!c.is_running());

        let result = c.invalidate("missing-oid").unwrap();
        assert_eq!(result, InvalidationResult { l1: false, l2: false });
        assert!(c.is_running());
        c.stop(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn explicit_stop_suppresses_auto_restart() {
        let c = coordinator(CoordinatorConfig {
            workers: 1,
            auto_restart: true,
            enable_l1: false,
            enable_l2: false,
            enable_l3: false,
            idle_sleep_seconds: 1,
        });
        c.start().unwrap();
        c.stop(Duration::from_secs(2)).unwrap();
        assert!(!c.is_running());

        let err = c.invalidate("after-stop").unwrap_err();
        assert!(matches!(err, CoordinatorError::CoordinatorStopped));
        assert!(!c.is_running());
    }

    #[test]
    fn worker_pool_drains_created_intent_into_l2_and_invalidates_l1() {
        let l1 = Arc::new(L1Cache::new(L1Config { vector_dim: 2, ..Default::default() }));
        let l2 = Arc::new(L2Cache::open_in_memory(L2Config { storage_path: String::new(), vector_dim: 2, ..Default::default() }).unwrap());
        let outbox = Arc::new(OutboxStore::open_in_memory(OutboxConfig { visibility_timeout_seconds: 30, ..Default::default() }).unwrap());
        l1.put("a".into(), vec![1.0, 0.0], fabric_core::Metadata::new()).unwrap();
        outbox.enqueue(WriteIntent::created("a".into(), vec![1.0, 0.0], fabric_core::Metadata::new()), None).unwrap();

        let c = CacheCoordinator::new(l1.clone(), l2.clone(), outbox.clone(), CoordinatorConfig {
            workers: 1,
            auto_restart: true,
            enable_l1: true,
            enable_l2: true,
            enable_l3: true,
            idle_sleep_seconds: 1,
        });
        c.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while l2.get("a").unwrap().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(l2.get("a").unwrap().is_some());
        assert!(l1.peek("a").is_none());

        c.stop(Duration::from_secs(2)).unwrap();
        let stats = c.get_statistics();
        assert_eq!(stats.total_processed, 1);
    }
}
