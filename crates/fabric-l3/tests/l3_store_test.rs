use fabric_core::config::{L3Config, OutboxConfig};
use fabric_core::{Concept, ConceptDiff};
use fabric_core::errors::L3Error;
use fabric_l3::L3Store;

fn l3_config(path: &str) -> L3Config {
    L3Config { storage_path: path.to_string(), read_only: false, replica_address: None, read_pool_size: 2 }
}

fn outbox_config(path: &str) -> OutboxConfig {
    OutboxConfig { batch_size: 8, visibility_timeout_seconds: 30, retry_limit: 5, storage_path: path.to_string(), capacity: 1000 }
}

/// A commit, a read, and a restart: the store's on-disk state must survive a
/// process boundary: on-disk persistence plus the colocated outbox.
#[test]
fn smoke_commit_survives_reopen_and_enqueues_outbox_entry() {
    let dir = std::env::temp_dir().join(format!("fabric_l3_smoke_{}", std::process::id()));
    let _ = std::fs::create_dir_all(&dir);
    let db_path = dir.join("l3.sqlite3").to_string_lossy().to_string();

    let oid = {
        let store = L3Store::open(l3_config(&db_path), outbox_config(&db_path)).unwrap();
        let concept = Concept::new(vec![1.0, 0.0, 0.0]);
        let oid = concept.oid.clone();
        store.store_concept(concept).unwrap();
        store.close().unwrap();
        oid
    };

    {
        let store = L3Store::open(l3_config(&db_path), outbox_config(&db_path)).unwrap();
        let concept = store.load_concept(&oid).unwrap().unwrap();
        assert_eq!(concept.geometric_embedding, vec![1.0, 0.0, 0.0]);

        let outbox = store.outbox();
        let reserved = outbox.reserve_pending(10).unwrap();
        assert_eq!(reserved.len(), 1);
        assert_eq!(reserved[0].payload.oid, oid);
    }

    let _ = std::fs::remove_dir_all(&dir);
}

/// A read-only store must reject every mutator with a distinct error kind, while
/// reads keep working: a read-only mode rejects all mutators.
#[test]
fn read_only_store_allows_reads_but_rejects_all_mutators() {
    let dir = std::env::temp_dir().join(format!("fabric_l3_readonly_{}", std::process::id()));
    let _ = std::fs::create_dir_all(&dir);
    let db_path = dir.join("l3.sqlite3").to_string_lossy().to_string();

    let oid = {
        let store = L3Store::open(l3_config(&db_path), outbox_config(&db_path)).unwrap();
        let concept = Concept::new(vec![1.0]);
        let oid = concept.oid.clone();
        store.store_concept(concept).unwrap();
        store.close().unwrap();
        oid
    };

    let mut cfg = l3_config(&db_path);
    cfg.read_only = true;
    let ro_outbox_cfg = {
        let mut c = outbox_config(&db_path);
        c.storage_path = db_path.clone();
        c
    };
    let store = L3Store::open(cfg, ro_outbox_cfg).unwrap();

    assert!(store.load_concept(&oid).unwrap().is_some());
    assert!(matches!(store.store_concept(Concept::new(vec![9.0])).unwrap_err(), L3Error::ReadOnly));
    assert!(matches!(store.update_concept(&oid, &ConceptDiff::new()).unwrap_err(), L3Error::ReadOnly));
    assert!(matches!(store.delete_concept(&oid).unwrap_err(), L3Error::ReadOnly));
    assert!(matches!(store.mutate_without_commit(&oid, ConceptDiff::new()).unwrap_err(), L3Error::ReadOnly));

    let _ = std::fs::remove_dir_all(&dir);
}

/// Staged mutations that are aborted leave no trace; staged mutations that are
/// committed land atomically alongside their outbox entry.
#[test]
fn abort_leaves_no_trace_commit_lands_atomically() {
    let store = L3Store::open_in_memory(
        L3Config { storage_path: String::new(), read_only: false, replica_address: None, read_pool_size: 2 },
        OutboxConfig { batch_size: 8, visibility_timeout_seconds: 30, retry_limit: 5, storage_path: String::new(), capacity: 1000 },
    )
    .unwrap();

    let concept = Concept::new(vec![1.0, 1.0]);
    let oid = concept.oid.clone();
    store.store_concept(concept).unwrap();
    store.outbox().reserve_pending(10).unwrap();
    store.outbox().mark_processed(1).unwrap();

    store.mutate_without_commit(&oid, ConceptDiff::new().with_metadata("draft", "x")).unwrap();
    store.abort_transaction().unwrap();
    let unchanged = store.load_concept(&oid).unwrap().unwrap();
    assert!(!unchanged.metadata.contains_key("draft"));
    let stats_after_abort = store.outbox().get_statistics().unwrap();
    assert_eq!(stats_after_abort.pending, 0);

    store.mutate_without_commit(&oid, ConceptDiff::new().with_metadata("final", "y")).unwrap();
    store.commit_transaction().unwrap();
    let changed = store.load_concept(&oid).unwrap().unwrap();
    assert!(changed.metadata.contains_key("final"));
    let stats_after_commit = store.outbox().get_statistics().unwrap();
    assert_eq!(stats_after_commit.pending, 1);
}
