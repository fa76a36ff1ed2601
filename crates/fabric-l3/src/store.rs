use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use fabric_core::config::{L3Config, OutboxConfig};
use fabric_core::errors::L3Error;
use fabric_core::{Concept, ConceptDiff, Confidence, Oid};
use fabric_outbox::{OutboxStore, WriteIntent};

use crate::pragmas::{apply_pragmas, apply_read_pragmas};
use crate::schema;
use crate::statistics::L3Statistics;

fn to_l3_err(e: impl std::fmt::Display) -> L3Error {
    L3Error::SqliteError { message: e.to_string() }
}

/// Round-robin pool of read-only connections, used only in file-backed mode (spec
/// §4.4: "supports read-only replicas"). Grounded on the workspace's own pooled
/// reader idiom: one writer connection serializes commits, many readers fan out.
struct ReadPool {
    connections: Vec<Mutex<Connection>>,
    next: AtomicU64,
}

impl ReadPool {
    fn open(path: &Path, size: usize) -> Result<Self, L3Error> {
        let mut connections = Vec::with_capacity(size.max(1));
        for _ in 0..size.max(1) {
            let conn = Connection::open_with_flags(
                path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(to_l3_err)?;
            apply_read_pragmas(&conn)?;
            connections.push(Mutex::new(conn));
        }
        Ok(Self { connections, next: AtomicU64::new(0) })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T, L3Error>) -> Result<T, L3Error> {
        let idx = (self.next.fetch_add(1, Ordering::Relaxed) as usize) % self.connections.len();
        let guard = self.connections[idx].lock().unwrap();
        f(&guard)
    }
}

#[derive(Debug, Default)]
struct FaultInjection {
    conflict_oid: Option<Oid>,
    disk_error: bool,
    unhandled_error: bool,
}

/// A staged, uncommitted mutation (`mutate_without_commit`). `baseline_updated_at`
/// is the `updated_at` this store observed when the mutation was staged; if the row
/// has moved on by the time `commit_transaction` runs, that's a conflict.
struct PendingMutation {
    diff: ConceptDiff,
    baseline_updated_at: Option<DateTime<Utc>>,
}

/// Transactional OID-keyed ground-truth store. A single writer
/// connection serializes commits; an optional pool of read-only connections serves
/// `load_concept` without contending with the writer. Every committed mutator
/// enqueues a write-intent on the colocated outbox in the same SQL transaction.
pub struct L3Store {
    writer: Arc<Mutex<Connection>>,
    readers: Option<ReadPool>,
    outbox: Arc<OutboxStore>,
    config: L3Config,
    pending: Mutex<HashMap<Oid, PendingMutation>>,
    fault: Mutex<FaultInjection>,
    total_commits: AtomicU64,
    total_aborts: AtomicU64,
    total_conflicts: AtomicU64,
    closed: AtomicBool,
}

impl L3Store {
    pub fn open(config: L3Config, outbox_config: OutboxConfig) -> Result<Self, L3Error> {
        let path = Path::new(&config.storage_path);
        let conn = Connection::open(path).map_err(to_l3_err)?;
        apply_pragmas(&conn)?;
        schema::initialize(&conn)?;
        let writer = Arc::new(Mutex::new(conn));
        let outbox = OutboxStore::from_shared_connection(Arc::clone(&writer), outbox_config)
            .map_err(|e| L3Error::SqliteError { message: e.to_string() })?;
        let readers = if config.read_only {
            None
        } else {
            Some(ReadPool::open(path, config.read_pool_size)?)
        };
        Ok(Self::assemble(writer, readers, outbox, config))
    }

    pub fn open_in_memory(config: L3Config, outbox_config: OutboxConfig) -> Result<Self, L3Error> {
        let conn = Connection::open_in_memory().map_err(to_l3_err)?;
        apply_pragmas(&conn)?;
        schema::initialize(&conn)?;
        let writer = Arc::new(Mutex::new(conn));
        let outbox = OutboxStore::from_shared_connection(Arc::clone(&writer), outbox_config)
            .map_err(|e| L3Error::SqliteError { message: e.to_string() })?;
        // In-memory mode has no separate file to pool readers against; reads go
        // through the same writer connection.
        Ok(Self::assemble(writer, None, outbox, config))
    }

    fn assemble(
        writer: Arc<Mutex<Connection>>,
        readers: Option<ReadPool>,
        outbox: OutboxStore,
        config: L3Config,
    ) -> Self {
        Self {
            writer,
            readers,
            outbox: Arc::new(outbox),
            config,
            pending: Mutex::new(HashMap::new()),
            fault: Mutex::new(FaultInjection::default()),
            total_commits: AtomicU64::new(0),
            total_aborts: AtomicU64::new(0),
            total_conflicts: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// A handle to the colocated outbox, for the coordinator to drain.
    pub fn outbox(&self) -> Arc<OutboxStore> {
        Arc::clone(&self.outbox)
    }

    fn check_writable(&self) -> Result<(), L3Error> {
        if self.config.read_only {
            return Err(L3Error::ReadOnly);
        }
        self.check_faults()
    }

    fn check_faults(&self) -> Result<(), L3Error> {
        let fault = self.fault.lock().unwrap();
        if fault.disk_error {
            return Err(L3Error::InjectedFault("disk error".to_string()));
        }
        if fault.unhandled_error {
            return Err(L3Error::InjectedFault("unhandled error".to_string()));
        }
        Ok(())
    }

    /// Test-only fault injection: force the next commit touching `oid`
    /// to fail with `ConflictError`.
    pub fn force_conflict_error(&self, oid: &str) {
        self.fault.lock().unwrap().conflict_oid = Some(oid.to_string());
    }

    pub fn force_disk_error(&self, enabled: bool) {
        self.fault.lock().unwrap().disk_error = enabled;
    }

    pub fn force_unhandled_error(&self, enabled: bool) {
        self.fault.lock().unwrap().unhandled_error = enabled;
    }

    fn row_to_concept(row: &rusqlite::Row<'_>) -> rusqlite::Result<Concept> {
        let oid: String = row.get(0)?;
        let symbolic_vector: Option<String> = row.get(1)?;
        let geometric_embedding: String = row.get(2)?;
        let metadata: String = row.get(3)?;
        let relations: String = row.get(4)?;
        let confidence: f64 = row.get(5)?;
        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;

        Ok(Concept {
            oid,
            symbolic_vector: symbolic_vector.and_then(|s| serde_json::from_str(&s).ok()),
            geometric_embedding: serde_json::from_str(&geometric_embedding).unwrap_or_default(),
            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
            relations: serde_json::from_str(&relations).unwrap_or_default(),
            confidence: Confidence::new(confidence),
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            updated_at: DateTime::parse_from_rfc3339(&updated_at)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    fn load_row(conn: &Connection, oid: &str) -> Result<Option<Concept>, L3Error> {
        conn.query_row(
            "SELECT oid, symbolic_vector, geometric_embedding, metadata, relations, confidence, created_at, updated_at
             FROM concepts WHERE oid = ?1",
            params![oid],
            Self::row_to_concept,
        )
        .optional()
        .map_err(to_l3_err)
    }

    fn upsert_row(conn: &Connection, concept: &Concept) -> Result<(), L3Error> {
        let symbolic_vector = concept
            .symbolic_vector
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| to_l3_err(e.to_string()))?;
        let geometric_embedding =
            serde_json::to_string(&concept.geometric_embedding).map_err(|e| to_l3_err(e.to_string()))?;
        let metadata = serde_json::to_string(&concept.metadata).map_err(|e| to_l3_err(e.to_string()))?;
        let relations = serde_json::to_string(&concept.relations).map_err(|e| to_l3_err(e.to_string()))?;

        conn.execute(
            "INSERT INTO concepts (oid, symbolic_vector, geometric_embedding, metadata, relations, confidence, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(oid) DO UPDATE SET
                symbolic_vector = excluded.symbolic_vector,
                geometric_embedding = excluded.geometric_embedding,
                metadata = excluded.metadata,
                relations = excluded.relations,
                confidence = excluded.confidence,
                updated_at = excluded.updated_at",
            params![
                concept.oid,
                symbolic_vector,
                geometric_embedding,
                metadata,
                relations,
                concept.confidence.value(),
                concept.created_at.to_rfc3339(),
                concept.updated_at.to_rfc3339(),
            ],
        )
        .map_err(to_l3_err)?;
        Ok(())
    }

    /// Insert a brand-new concept and enqueue its `created` write-intent in the same
    /// transaction.
    pub fn store_concept(&self, concept: Concept) -> Result<Oid, L3Error> {
        self.check_writable()?;
        let conn = self.writer.lock().unwrap();
        let tx = conn.unchecked_transaction().map_err(to_l3_err)?;
        Self::upsert_row(&tx, &concept)?;
        let intent = WriteIntent::created(concept.oid.clone(), concept.geometric_embedding.clone(), concept.metadata.clone());
        fabric_outbox::insert_entry(&tx, &intent, None, self.outbox.retry_limit()).map_err(|e| to_l3_err(e.to_string()))?;
        tx.commit().map_err(to_l3_err)?;
        Ok(concept.oid)
    }

    /// Read a concept. Served from the read pool in file-backed mode so readers
    /// never block behind the writer.
    pub fn load_concept(&self, oid: &str) -> Result<Option<Concept>, L3Error> {
        self.check_faults()?;
        match &self.readers {
            Some(pool) => pool.with_conn(|conn| Self::load_row(conn, oid)),
            None => {
                let conn = self.writer.lock().unwrap();
                Self::load_row(&conn, oid)
            }
        }
    }

    fn is_forced_conflict(&self, oid: &str) -> bool {
        let mut fault = self.fault.lock().unwrap();
        if fault.conflict_oid.as_deref() == Some(oid) {
            fault.conflict_oid = None;
            true
        } else {
            false
        }
    }

    /// Apply a diff and commit immediately; enqueues an `updated` write-intent.
    /// Returns `false` (not an error) if the OID doesn't exist.
    pub fn update_concept(&self, oid: &str, diff: &ConceptDiff) -> Result<bool, L3Error> {
        self.check_writable()?;
        if self.is_forced_conflict(oid) {
            self.total_conflicts.fetch_add(1, Ordering::Relaxed);
            return Err(L3Error::ConflictError { oid: oid.to_string() });
        }
        let conn = self.writer.lock().unwrap();
        let tx = conn.unchecked_transaction().map_err(to_l3_err)?;
        let Some(mut concept) = Self::load_row(&tx, oid)? else {
            tx.rollback().map_err(to_l3_err)?;
            return Ok(false);
        };
        concept.apply_diff(diff);
        Self::upsert_row(&tx, &concept)?;
        let intent = WriteIntent::updated(concept.oid.clone(), concept.geometric_embedding.clone(), concept.metadata.clone());
        fabric_outbox::insert_entry(&tx, &intent, None, self.outbox.retry_limit()).map_err(|e| to_l3_err(e.to_string()))?;
        tx.commit().map_err(to_l3_err)?;
        Ok(true)
    }

    /// Delete a concept and enqueue a `deleted` write-intent. Returns `false` (not an
    /// error) if the OID doesn't exist.
    pub fn delete_concept(&self, oid: &str) -> Result<bool, L3Error> {
        self.check_writable()?;
        let conn = self.writer.lock().unwrap();
        let tx = conn.unchecked_transaction().map_err(to_l3_err)?;
        let affected = tx.execute("DELETE FROM concepts WHERE oid = ?1", params![oid]).map_err(to_l3_err)?;
        if affected == 0 {
            tx.rollback().map_err(to_l3_err)?;
            return Ok(false);
        }
        let intent = WriteIntent::deleted(oid.to_string());
        fabric_outbox::insert_entry(&tx, &intent, None, self.outbox.retry_limit()).map_err(|e| to_l3_err(e.to_string()))?;
        tx.commit().map_err(to_l3_err)?;
        Ok(true)
    }

    /// Stage a diff without committing. Multiple calls for the same
    /// OID merge by replacing the staged diff; the conflict baseline stays pinned to
    /// the first staging so a concurrent committed write in between is still caught.
    pub fn mutate_without_commit(&self, oid: &str, diff: ConceptDiff) -> Result<(), L3Error> {
        self.check_writable()?;
        let mut pending = self.pending.lock().unwrap();
        if let Some(existing) = pending.get_mut(oid) {
            existing.diff = diff;
        } else {
            let baseline_updated_at = self.load_concept(oid)?.map(|c| c.updated_at);
            pending.insert(oid.to_string(), PendingMutation { diff, baseline_updated_at });
        }
        Ok(())
    }

    /// Commit every staged mutation as one transaction. Each OID is re-checked
    /// against its baseline `updated_at`; a mismatch means someone else committed in
    /// between, which fails the whole commit with `ConflictError` (callers retry
    /// with freshly read state). Staged mutations survive a failed
    /// commit so the caller can re-stage and retry.
    pub fn commit_transaction(&self) -> Result<(), L3Error> {
        self.check_writable()?;
        let mut pending = self.pending.lock().unwrap();
        if pending.is_empty() {
            return Err(L3Error::NoOpenTransaction);
        }

        let conn = self.writer.lock().unwrap();
        let tx = conn.unchecked_transaction().map_err(to_l3_err)?;

        for (oid, staged) in pending.iter() {
            if self.is_forced_conflict(oid) {
                self.total_conflicts.fetch_add(1, Ordering::Relaxed);
                let _ = tx.rollback();
                return Err(L3Error::ConflictError { oid: oid.clone() });
            }
            let current = Self::load_row(&tx, oid)?;
            let current_updated_at = current.as_ref().map(|c| c.updated_at);
            if current_updated_at != staged.baseline_updated_at {
                self.total_conflicts.fetch_add(1, Ordering::Relaxed);
                let _ = tx.rollback();
                return Err(L3Error::ConflictError { oid: oid.clone() });
            }
            let Some(mut concept) = current else {
                continue;
            };
            concept.apply_diff(&staged.diff);
            Self::upsert_row(&tx, &concept)?;
            let intent = WriteIntent::updated(concept.oid.clone(), concept.geometric_embedding.clone(), concept.metadata.clone());
            fabric_outbox::insert_entry(&tx, &intent, None, self.outbox.retry_limit()).map_err(|e| to_l3_err(e.to_string()))?;
        }

        tx.commit().map_err(to_l3_err)?;
        pending.clear();
        self.total_commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Discard every staged mutation without writing anything.
    pub fn abort_transaction(&self) -> Result<(), L3Error> {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_empty() {
            return Err(L3Error::NoOpenTransaction);
        }
        pending.clear();
        self.total_aborts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn get_statistics(&self) -> Result<L3Statistics, L3Error> {
        let conn = self.writer.lock().unwrap();
        let total_concepts: i64 =
            conn.query_row("SELECT COUNT(*) FROM concepts", [], |row| row.get(0)).map_err(to_l3_err)?;
        Ok(L3Statistics {
            total_concepts: total_concepts as u64,
            total_commits: self.total_commits.load(Ordering::Relaxed),
            total_aborts: self.total_aborts.load(Ordering::Relaxed),
            total_conflicts: self.total_conflicts.load(Ordering::Relaxed),
        })
    }

    /// Checkpoint the WAL and mark the store closed. Subsequent mutators still
    /// function (SQLite itself stays open); this mirrors the ground-truth store's
    /// "close" being primarily a durability flush, not a handle teardown, since the
    /// coordinator may still hold outstanding references to the shared outbox.
    pub fn close(&self) -> Result<(), L3Error> {
        let conn = self.writer.lock().unwrap();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);").map_err(to_l3_err)?;
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_core::config::{L3Config as Cfg, OutboxConfig as OCfg};

    fn l3_config() -> Cfg {
        Cfg { storage_path: String::new(), read_only: false, replica_address: None, read_pool_size: 2 }
    }

    fn outbox_config() -> OCfg {
        OCfg { batch_size: 8, visibility_timeout_seconds: 30, retry_limit: 5, storage_path: String::new(), capacity: 1000 }
    }

    #[test]
    fn store_then_load_round_trips() {
        let store = L3Store::open_in_memory(l3_config(), outbox_config()).unwrap();
        let concept = Concept::new(vec![1.0, 2.0]);
        let oid = concept.oid.clone();
        store.store_concept(concept).unwrap();

        let loaded = store.load_concept(&oid).unwrap().unwrap();
        assert_eq!(loaded.geometric_embedding, vec![1.0, 2.0]);

        let stats = store.get_statistics().unwrap();
        assert_eq!(stats.total_concepts, 1);

        let outbox_stats = store.outbox().get_statistics().unwrap();
        assert_eq!(outbox_stats.pending, 1);
    }

    #[test]
    fn update_of_missing_oid_returns_false() {
        let store = L3Store::open_in_memory(l3_config(), outbox_config()).unwrap();
        let updated = store.update_concept("nope", &ConceptDiff::new()).unwrap();
        assert!(!updated);
    }

    #[test]
    fn delete_of_missing_oid_returns_false() {
        let store = L3Store::open_in_memory(l3_config(), outbox_config()).unwrap();
        assert!(!store.delete_concept("nope").unwrap());
    }

    #[test]
    fn read_only_store_rejects_mutators() {
        let mut cfg = l3_config();
        cfg.read_only = true;
        let store = L3Store::open_in_memory(cfg, outbox_config()).unwrap();
        let err = store.store_concept(Concept::new(vec![1.0])).unwrap_err();
        assert!(matches!(err, L3Error::ReadOnly));
    }

    #[test]
    fn mutate_without_commit_is_invisible_until_commit() {
        let store = L3Store::open_in_memory(l3_config(), outbox_config()).unwrap();
        let concept = Concept::new(vec![1.0]);
        let oid = concept.oid.clone();
        store.store_concept(concept).unwrap();

        store
            .mutate_without_commit(&oid, ConceptDiff::new().with_metadata("label", "staged"))
            .unwrap();
        let before_commit = store.load_concept(&oid).unwrap().unwrap();
        assert!(!before_commit.metadata.contains_key("label"));

        store.commit_transaction().unwrap();
        let after_commit = store.load_concept(&oid).unwrap().unwrap();
        assert!(after_commit.metadata.contains_key("label"));
    }

    #[test]
    fn abort_transaction_discards_staged_mutation() {
        let store = L3Store::open_in_memory(l3_config(), outbox_config()).unwrap();
        let concept = Concept::new(vec![1.0]);
        let oid = concept.oid.clone();
        store.store_concept(concept).unwrap();
        store.mutate_without_commit(&oid, ConceptDiff::new().with_metadata("label", "x")).unwrap();
        store.abort_transaction().unwrap();
        let err = store.commit_transaction().unwrap_err();
        assert!(matches!(err, L3Error::NoOpenTransaction));
    }

    #[test]
    fn commit_with_nothing_staged_is_an_error() {
        let store = L3Store::open_in_memory(l3_config(), outbox_config()).unwrap();
        let err = store.commit_transaction().unwrap_err();
        assert!(matches!(err, L3Error::NoOpenTransaction));
    }

    #[test]
    fn forced_conflict_error_surfaces_on_update() {
        let store = L3Store::open_in_memory(l3_config(), outbox_config()).unwrap();
        let concept = Concept::new(vec![1.0]);
        let oid = concept.oid.clone();
        store.store_concept(concept).unwrap();
        store.force_conflict_error(&oid);
        let err = store.update_concept(&oid, &ConceptDiff::new()).unwrap_err();
        assert!(matches!(err, L3Error::ConflictError { .. }));
    }

    #[test]
    fn forced_disk_error_blocks_further_mutators() {
        let store = L3Store::open_in_memory(l3_config(), outbox_config()).unwrap();
        store.force_disk_error(true);
        let err = store.store_concept(Concept::new(vec![1.0])).unwrap_err();
        assert!(matches!(err, L3Error::InjectedFault(_)));
    }

    #[test]
    fn concurrent_stage_then_external_commit_conflicts_at_commit_time() {
        let store = L3Store::open_in_memory(l3_config(), outbox_config()).unwrap();
        let concept = Concept::new(vec![1.0]);
        let oid = concept.oid.clone();
        store.store_concept(concept).unwrap();

        store.mutate_without_commit(&oid, ConceptDiff::new().with_metadata("from_stage", "a")).unwrap();
        // Someone else commits directly in between, moving `updated_at` forward.
        store.update_concept(&oid, &ConceptDiff::new().with_metadata("from_direct", "b")).unwrap();

        let err = store.commit_transaction().unwrap_err();
        assert!(matches!(err, L3Error::ConflictError { oid: ref o } if o == &oid));
    }
}
