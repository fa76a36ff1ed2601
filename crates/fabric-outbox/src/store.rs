use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use fabric_core::config::OutboxConfig;
use fabric_core::errors::OutboxError;
use fabric_core::Metadata;

use crate::payload::{WriteIntent, WriteIntentKind};
use crate::schema;

fn to_outbox_err(e: impl std::fmt::Display) -> OutboxError {
    OutboxError::SqliteError { message: e.to_string() }
}

/// Terminal and non-terminal states an entry moves through: entries leave
/// `pending` only via `processed` or `dead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxState {
    Pending,
    InFlight,
    Processed,
    Dead,
}

impl OutboxState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Processed => "processed",
            Self::Dead => "dead",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "in_flight" => Self::InFlight,
            "processed" => Self::Processed,
            "dead" => Self::Dead,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: i64,
    pub payload: WriteIntent,
    pub headers: Option<Metadata>,
    pub enqueue_time: DateTime<Utc>,
    pub visible_after: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub state: OutboxState,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct OutboxStatistics {
    pub pending: u64,
    pub inflight: u64,
    pub processed: u64,
    pub dlq: u64,
    pub total_enqueued: u64,
}

/// Insert a write-intent row on an already-open connection/transaction. This is the
/// low-level primitive the L3 ground-truth store calls from inside its own commit,
/// so every committed mutator atomically enqueues a corresponding outbox entry,
/// and the one `OutboxStore::enqueue` below calls for standalone use.
///
/// `max_attempts` is the configured `retry_limit` (retries after the first attempt,
/// not a total-attempts count) — see `OutboxStore::mark_failed`.
pub fn insert_entry(
    conn: &Connection,
    payload: &WriteIntent,
    headers: Option<&Metadata>,
    max_attempts: u32,
) -> Result<i64, OutboxError> {
    let payload_json = serde_json::to_string(payload).map_err(|e| to_outbox_err(e.to_string()))?;
    let headers_json = headers
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| to_outbox_err(e.to_string()))?;
    conn.execute(
        "INSERT INTO outbox_entries (oid, payload, headers, enqueue_time, visible_after, attempts, max_attempts, state)
         VALUES (?1, ?2, ?3, ?4, NULL, 0, ?5, 'pending')",
        params![payload.oid, payload_json, headers_json, Utc::now().to_rfc3339(), max_attempts],
    )
    .map_err(to_outbox_err)?;
    Ok(conn.last_insert_rowid())
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxEntry> {
    let id: i64 = row.get(0)?;
    let payload_json: String = row.get(1)?;
    let headers_json: Option<String> = row.get(2)?;
    let enqueue_time: String = row.get(3)?;
    let visible_after: Option<String> = row.get(4)?;
    let attempts: i64 = row.get(5)?;
    let max_attempts: i64 = row.get(6)?;
    let state: String = row.get(7)?;

    let payload: WriteIntent = serde_json::from_str(&payload_json).unwrap_or(WriteIntent {
        kind: WriteIntentKind::Invalidated,
        oid: String::new(),
        vector: None,
        metadata: None,
    });
    let headers: Option<Metadata> = headers_json.and_then(|s| serde_json::from_str(&s).ok());

    Ok(OutboxEntry {
        id,
        payload,
        headers,
        enqueue_time: DateTime::parse_from_rfc3339(&enqueue_time).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now()),
        visible_after: visible_after.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
        attempts: attempts as u32,
        max_attempts: max_attempts as u32,
        state: OutboxState::parse(&state),
    })
}

/// The transactional outbox: a durable FIFO of write-intents with at-least-once
/// delivery, visibility timeouts, retry, and a dead-letter queue.
///
/// Grounded in structure on the ground-truth store's own connection-pool idiom
/// (one writer connection, serialized access), widened with the queue-specific
/// operations confirmed against `test_transactional_outbox.py`.
pub struct OutboxStore {
    conn: Arc<Mutex<Connection>>,
    config: OutboxConfig,
}

impl OutboxStore {
    pub fn open(config: OutboxConfig) -> Result<Self, OutboxError> {
        let conn = Connection::open(&config.storage_path).map_err(to_outbox_err)?;
        schema::initialize(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)), config })
    }

    pub fn open_in_memory(config: OutboxConfig) -> Result<Self, OutboxError> {
        let conn = Connection::open_in_memory().map_err(to_outbox_err)?;
        schema::initialize(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)), config })
    }

    /// Share an already-open connection (used when the fabric façade colocates the
    /// outbox with a file-backed L3 on the very same database file/connection, so an
    /// L3 commit and its outbox enqueue serialize through one lock and land in one
    /// SQL transaction). `conn` must already have the outbox schema applied, or be
    /// about to have it applied by this call (idempotent via `IF NOT EXISTS`).
    pub fn from_shared_connection(
        conn: Arc<Mutex<Connection>>,
        config: OutboxConfig,
    ) -> Result<Self, OutboxError> {
        {
            let guard = conn.lock().unwrap();
            schema::initialize(&guard)?;
        }
        Ok(Self { conn, config })
    }

    /// The configured `retry_limit`, for callers that enqueue through
    /// `insert_entry` directly (on a shared connection) instead of `enqueue`, so
    /// they use the same budget rather than an independent literal.
    pub fn retry_limit(&self) -> u32 {
        self.config.retry_limit
    }

    fn pending_and_inflight_count(&self, conn: &Connection) -> Result<i64, OutboxError> {
        conn.query_row(
            "SELECT COUNT(*) FROM outbox_entries WHERE state IN ('pending', 'in_flight')",
            [],
            |row| row.get(0),
        )
        .map_err(to_outbox_err)
    }

    /// Enqueue a write-intent. Blocks (bounded) while the outbox is at capacity,
    /// applying backpressure to whoever is calling.
    pub fn enqueue(&self, payload: WriteIntent, headers: Option<Metadata>) -> Result<i64, OutboxError> {
        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            let conn = self.conn.lock().unwrap();
            let count = self.pending_and_inflight_count(&conn)?;
            if (count as usize) < self.config.capacity {
                return insert_entry(&conn, &payload, headers.as_ref(), self.config.retry_limit);
            }
            drop(conn);
            if Instant::now() >= deadline {
                return Err(OutboxError::AtCapacity { capacity: self.config.capacity });
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    /// Reserve up to `batch_size` pending entries in FIFO (ascending id) order,
    /// marking them `in_flight` with a fresh `visible_after`.
    pub fn reserve_pending(&self, batch_size: usize) -> Result<Vec<OutboxEntry>, OutboxError> {
        self.reserve_pending_partitioned(batch_size, 1, 0)
    }

    /// Reserve pending entries belonging to one partition of a hash-partitioned
    /// worker pool. Per-OID ordering is preserved either by a per-OID lock or by
    /// hash-partitioning OIDs across workers; the coordinator uses the latter.
    /// Scans more than `batch_size` candidates so that partitioning doesn't starve a
    /// worker just because OIDs ahead of it in id order hash elsewhere.
    pub fn reserve_pending_partitioned(
        &self,
        batch_size: usize,
        partition_count: usize,
        partition_index: usize,
    ) -> Result<Vec<OutboxEntry>, OutboxError> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let scan_limit = (batch_size * partition_count.max(1) * 4).max(batch_size) as i64;
        let mut stmt = conn
            .prepare(
                "SELECT id, payload, headers, enqueue_time, visible_after, attempts, max_attempts, state
                 FROM outbox_entries WHERE state = 'pending' ORDER BY id ASC LIMIT ?1",
            )
            .map_err(to_outbox_err)?;
        let rows = stmt.query_map(params![scan_limit], row_to_entry).map_err(to_outbox_err)?;

        let mut reserved = Vec::new();
        let now = Utc::now();
        let visible_after = now + chrono::Duration::seconds(self.config.visibility_timeout_seconds as i64);
        for row in rows {
            let entry = row.map_err(to_outbox_err)?;
            if partition_count > 1 {
                let hash = blake3::hash(entry.payload.oid.as_bytes());
                let bucket = (u64::from_le_bytes(hash.as_bytes()[0..8].try_into().unwrap()) as usize)
                    % partition_count;
                if bucket != partition_index {
                    continue;
                }
            }
            reserved.push(entry);
            if reserved.len() >= batch_size {
                break;
            }
        }
        drop(stmt);

        for entry in &reserved {
            conn.execute(
                "UPDATE outbox_entries SET state = 'in_flight', visible_after = ?2 WHERE id = ?1",
                params![entry.id, visible_after.to_rfc3339()],
            )
            .map_err(to_outbox_err)?;
        }
        Ok(reserved
            .into_iter()
            .map(|mut e| {
                e.state = OutboxState::InFlight;
                e.visible_after = Some(visible_after);
                e
            })
            .collect())
    }

    pub fn mark_processed(&self, id: i64) -> Result<(), OutboxError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn
            .execute("UPDATE outbox_entries SET state = 'processed' WHERE id = ?1", params![id])
            .map_err(to_outbox_err)?;
        if affected == 0 {
            return Err(OutboxError::NotFound { id });
        }
        Ok(())
    }

    /// Increments `attempts`; moves to the dead-letter queue once `attempts`
    /// *exceeds* `max_attempts` (the configured `retry_limit`), otherwise requeues
    /// as `pending`. `max_attempts` counts retries after the first attempt, so
    /// `retry_limit = 1` allows one retry and the entry goes dead on its *second*
    /// failure. Returns `true` if the entry moved to the DLQ.
    pub fn mark_failed(&self, id: i64, reason: &str) -> Result<bool, OutboxError> {
        let conn = self.conn.lock().unwrap();
        let (attempts, max_attempts): (i64, i64) = conn
            .query_row(
                "SELECT attempts, max_attempts FROM outbox_entries WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(to_outbox_err)?
            .ok_or(OutboxError::NotFound { id })?;

        let new_attempts = attempts + 1;
        let dead = new_attempts > max_attempts;
        let new_state = if dead { "dead" } else { "pending" };
        conn.execute(
            "UPDATE outbox_entries SET attempts = ?2, state = ?3, visible_after = NULL WHERE id = ?1",
            params![id, new_attempts, new_state],
        )
        .map_err(to_outbox_err)?;
        if dead {
            tracing::warn!(id, reason, "outbox entry exhausted its retry budget, moved to DLQ");
        } else {
            tracing::debug!(id, reason, attempts = new_attempts, "outbox entry failed, requeued");
        }
        Ok(dead)
    }

    /// Return in-flight entries whose `visible_after` has passed back to `pending`,
    /// preserving id ascending order so reaped entries keep FIFO order across
    /// restarts.
    pub fn reap_timeouts(&self) -> Result<Vec<i64>, OutboxError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let mut stmt = conn
            .prepare(
                "SELECT id FROM outbox_entries WHERE state = 'in_flight' AND visible_after < ?1 ORDER BY id ASC",
            )
            .map_err(to_outbox_err)?;
        let ids: Vec<i64> = stmt
            .query_map(params![now], |row| row.get(0))
            .map_err(to_outbox_err)?
            .collect::<Result<_, _>>()
            .map_err(to_outbox_err)?;
        drop(stmt);
        for id in &ids {
            conn.execute(
                "UPDATE outbox_entries SET state = 'pending', visible_after = NULL WHERE id = ?1",
                params![id],
            )
            .map_err(to_outbox_err)?;
        }
        Ok(ids)
    }

    /// Delete up to `max` processed entries (lowest id first). Never touches
    /// `pending`, `in_flight`, or `dead` rows.
    pub fn purge_processed(&self, max: usize) -> Result<usize, OutboxError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn
            .execute(
                "DELETE FROM outbox_entries WHERE id IN (
                    SELECT id FROM outbox_entries WHERE state = 'processed' ORDER BY id ASC LIMIT ?1
                )",
                params![max as i64],
            )
            .map_err(to_outbox_err)?;
        Ok(affected)
    }

    pub fn get_statistics(&self) -> Result<OutboxStatistics, OutboxError> {
        let conn = self.conn.lock().unwrap();
        let mut stats = OutboxStatistics::default();
        let mut stmt = conn
            .prepare("SELECT state, COUNT(*) FROM outbox_entries GROUP BY state")
            .map_err(to_outbox_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(to_outbox_err)?;
        for row in rows {
            let (state, count) = row.map_err(to_outbox_err)?;
            match state.as_str() {
                "pending" => stats.pending = count as u64,
                "in_flight" => stats.inflight = count as u64,
                "processed" => stats.processed = count as u64,
                "dead" => stats.dlq = count as u64,
                _ => {}
            }
        }
        drop(stmt);
        stats.total_enqueued = conn
            .query_row("SELECT COUNT(*) FROM outbox_entries", [], |row| row.get::<_, i64>(0))
            .map_err(to_outbox_err)? as u64;
        Ok(stats)
    }

    /// Force a WAL checkpoint. In-flight entries are left exactly as they are:
    /// they remain `in_flight` on disk and are reaped back to `pending` by the
    /// next `reap_timeouts` call after restart.
    pub fn shutdown(&self) -> Result<(), OutboxError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);").map_err(to_outbox_err)
    }
}
