use std::time::{Duration, Instant};

use fabric::{Fabric, NewConcept, Tier};
use fabric_core::config::{CoordinatorConfig, L1Config, L2Config, L3Config, OutboxConfig, PromotionConfig};
use fabric_core::FabricConfig;

fn config() -> FabricConfig {
    FabricConfig {
        l1: L1Config { max_size: 32, vector_dim: 3, promotion_threshold: 2, promotion_requeue_step: 1, ..Default::default() },
        l2: L2Config { storage_path: ":memory:".to_string(), max_size: 32, vector_dim: 3, ..Default::default() },
        l3: L3Config { storage_path: ":memory:".to_string(), ..Default::default() },
        coordinator: CoordinatorConfig { workers: 2, idle_sleep_seconds: 1, ..Default::default() },
        outbox: OutboxConfig::default(),
        promotions: PromotionConfig { enabled: false, notify_coordinator: false, ..Default::default() },
    }
}

fn wait_until<F: Fn() -> bool>(f: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !f() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Create, let the coordinator drain the concept into L2, read it back with
/// the lift it should trigger, invalidate it, then re-read from L3 (lifting
/// back into L2 a second time).
#[test]
fn create_drain_lift_invalidate_round_trip() {
    let fabric = Fabric::initialize(config()).unwrap();

    let oid = fabric
        .create_concept(
            NewConcept::new(vec![1.0, 0.0, 0.0])
                .with_metadata([("label".to_string(), "a".into())].into_iter().collect()),
        )
        .unwrap();

    wait_until(|| fabric.l2().get(&oid).unwrap().is_some());
    assert!(fabric.l1().peek(&oid).is_none(), "coordinator's first drain should not populate L1");

    let first_read = fabric.get_concept(&oid).unwrap().unwrap();
    assert_eq!(first_read.tier, Tier::L2);
    wait_until(|| fabric.l1().peek(&oid).is_some());

    let invalidated = fabric.invalidate_concept(&oid).unwrap();
    assert!(invalidated.l1);
    assert!(invalidated.l2);
    assert!(invalidated.l3);

    let second_read = fabric.get_concept(&oid).unwrap().unwrap();
    assert_eq!(second_read.tier, Tier::L3);
    wait_until(|| fabric.l2().get(&oid).unwrap().is_some());

    fabric.shutdown().unwrap();
}

/// `initialize` with an unusable L2 storage path must unwind the L3 store it
/// already opened rather than leaking a half-built fabric.
#[test]
fn initialize_rolls_back_l3_when_l2_fails_to_open() {
    let mut cfg = config();
    cfg.l2.storage_path = "/nonexistent/definitely/not/a/real/directory/l2.sqlite3".to_string();

    let err = Fabric::initialize(cfg).unwrap_err();
    assert!(matches!(err, fabric_core::FabricError::L2(_)));
}

/// A promotion cycle, run through the façade, moves a hot L1 entry into L2
/// without the caller touching `fabric-coordinator` directly.
#[test]
fn promote_l1_candidates_runs_through_the_facade() {
    let fabric = Fabric::initialize(config()).unwrap();
    fabric.l1().put("hot".to_string(), vec![0.0, 1.0, 0.0], Default::default()).unwrap();
    fabric.l1().get("hot");
    fabric.l1().get("hot");

    let result = fabric.promote_l1_candidates(Some(10));
    assert!(result.success);
    assert_eq!(result.promoted_oids, vec!["hot".to_string()]);
    assert!(fabric.l2().get("hot").unwrap().is_some());

    fabric.shutdown().unwrap();
}

/// `get_cache_statistics` and `validate` are both advertised never to raise;
/// confirm they keep returning sensible data across a real multi-tier stack.
#[test]
fn statistics_and_validation_reflect_live_state() {
    let fabric = Fabric::initialize(config()).unwrap();
    assert!(fabric.validate().ok);

    fabric.create_concept(NewConcept::new(vec![1.0, 0.0, 0.0])).unwrap();
    wait_until(|| fabric.get_cache_statistics().l3.total_concepts == 1);

    let stats = fabric.get_cache_statistics();
    assert_eq!(stats.l3.total_concepts, 1);

    fabric.shutdown().unwrap();
    let report = fabric.validate();
    assert!(!report.ok);
    assert!(!report.issues.is_empty());
}
