use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use fabric_core::config::L2Config;
use fabric_core::errors::L2Error;
use fabric_core::{Metadata, Oid};
use fabric_vector::{cosine_similarity, Hit};

use crate::schema;
use crate::telemetry::{L2Telemetry, TelemetryState};

fn to_l2_err(e: impl std::fmt::Display) -> L2Error {
    L2Error::SqliteError { message: e.to_string() }
}

fn f32_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// A row read back from the sidecar table.
#[derive(Debug, Clone, PartialEq)]
pub struct L2Entry {
    pub oid: Oid,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct L2Statistics {
    pub size: usize,
    pub max_size: usize,
}

/// The L2 warm cache: a persistent ANN index plus metadata sidecar,
/// both collapsed into a single SQLite table so every write is one atomic
/// transaction across "index" and "sidecar" data. Grounded on the same
/// rusqlite-backed-cache shape the embedding crate uses for its own L2 tier, widened
/// to the full put/get/remove/search/flush/compact surface the fabric needs.
pub struct L2Cache {
    conn: Mutex<Connection>,
    config: L2Config,
    telemetry: Mutex<TelemetryState>,
}

impl L2Cache {
    pub fn open(config: L2Config) -> Result<Self, L2Error> {
        let conn = Connection::open(&config.storage_path).map_err(to_l2_err)?;
        schema::initialize(&conn)?;
        let telemetry = TelemetryState::new(config.eviction_history_capacity);
        Ok(Self { conn: Mutex::new(conn), config, telemetry: Mutex::new(telemetry) })
    }

    pub fn open_in_memory(config: L2Config) -> Result<Self, L2Error> {
        let conn = Connection::open_in_memory().map_err(to_l2_err)?;
        schema::initialize(&conn)?;
        let telemetry = TelemetryState::new(config.eviction_history_capacity);
        Ok(Self { conn: Mutex::new(conn), config, telemetry: Mutex::new(telemetry) })
    }

    fn check_dim(&self, vector: &[f32]) -> Result<(), L2Error> {
        if vector.len() != self.config.vector_dim {
            return Err(L2Error::DimensionMismatch {
                expected: self.config.vector_dim,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Durable once it returns `Ok`: `INSERT OR REPLACE` plus eviction run inside one
    /// transaction, committed before returning.
    pub fn put(&self, oid: &str, vector: Vec<f32>, metadata: Metadata) -> Result<(), L2Error> {
        self.check_dim(&vector)?;
        let blob = f32_to_bytes(&vector);
        let meta_json = serde_json::to_string(&metadata).map_err(|e| to_l2_err(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(to_l2_err)?;
        tx.execute(
            "INSERT INTO l2_entries (oid, embedding, metadata, insert_time, last_access_time)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(oid) DO UPDATE SET
                embedding = excluded.embedding,
                metadata = excluded.metadata,
                last_access_time = excluded.last_access_time",
            params![oid, blob, meta_json, now],
        )
        .map_err(to_l2_err)?;

        let count: i64 = tx
            .query_row("SELECT COUNT(*) FROM l2_entries", [], |row| row.get(0))
            .map_err(to_l2_err)?;
        let excess = (count as usize).saturating_sub(self.config.max_size);
        let mut evicted_oids = Vec::new();
        if excess > 0 {
            let mut stmt = tx
                .prepare("SELECT oid FROM l2_entries ORDER BY last_access_time ASC LIMIT ?1")
                .map_err(to_l2_err)?;
            let rows = stmt
                .query_map(params![excess as i64], |row| row.get::<_, String>(0))
                .map_err(to_l2_err)?;
            for row in rows {
                evicted_oids.push(row.map_err(to_l2_err)?);
            }
            drop(stmt);
            for evict_oid in &evicted_oids {
                tx.execute("DELETE FROM l2_entries WHERE oid = ?1", params![evict_oid])
                    .map_err(to_l2_err)?;
            }
        }
        tx.commit().map_err(to_l2_err)?;
        drop(conn);

        if !evicted_oids.is_empty() {
            let mut telemetry = self.telemetry.lock().unwrap();
            for evict_oid in evicted_oids {
                telemetry.record_eviction(evict_oid, "capacity");
            }
        }
        Ok(())
    }

    pub fn get(&self, oid: &str) -> Result<Option<L2Entry>, L2Error> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(Vec<u8>, String)> = conn
            .query_row(
                "SELECT embedding, metadata FROM l2_entries WHERE oid = ?1",
                params![oid],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(to_l2_err)?;
        let Some((blob, meta_json)) = row else { return Ok(None) };
        conn.execute(
            "UPDATE l2_entries SET last_access_time = ?2 WHERE oid = ?1",
            params![oid, Utc::now().to_rfc3339()],
        )
        .map_err(to_l2_err)?;
        let metadata: Metadata = serde_json::from_str(&meta_json).unwrap_or_default();
        Ok(Some(L2Entry { oid: oid.to_string(), embedding: bytes_to_f32(&blob), metadata }))
    }

    pub fn remove(&self, oid: &str) -> Result<bool, L2Error> {
        let conn = self.conn.lock().unwrap();
        let affected = conn
            .execute("DELETE FROM l2_entries WHERE oid = ?1", params![oid])
            .map_err(to_l2_err)?;
        Ok(affected > 0)
    }

    pub fn search_similar(
        &self,
        query: &[f32],
        k: usize,
        threshold: Option<f64>,
    ) -> Result<Vec<Hit>, L2Error> {
        let start = Instant::now();
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT oid, embedding FROM l2_entries")
            .map_err(to_l2_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))
            .map_err(to_l2_err)?;

        let mut hits = Vec::new();
        for row in rows {
            let (oid, blob) = row.map_err(to_l2_err)?;
            let vec = bytes_to_f32(&blob);
            if vec.len() != query.len() {
                continue;
            }
            let score = cosine_similarity(query, &vec);
            if threshold.map_or(true, |t| score >= t) {
                hits.push(Hit { oid, score });
            }
        }
        drop(stmt);
        drop(conn);

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.oid.cmp(&b.oid)));
        hits.truncate(k);

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        let similarities: Vec<f64> = hits.iter().map(|h| h.score).collect();
        self.telemetry.lock().unwrap().record_search(&similarities, latency_ms);
        Ok(hits)
    }

    /// Force a WAL checkpoint so the on-disk file reflects every committed write.
    pub fn flush(&self) -> Result<(), L2Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);").map_err(to_l2_err)
    }

    /// Reclaim space from deleted/evicted rows.
    pub fn compact(&self) -> Result<(), L2Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("VACUUM;").map_err(to_l2_err)
    }

    pub fn get_statistics(&self) -> Result<L2Statistics, L2Error> {
        let conn = self.conn.lock().unwrap();
        let size: i64 = conn
            .query_row("SELECT COUNT(*) FROM l2_entries", [], |row| row.get(0))
            .map_err(to_l2_err)?;
        Ok(L2Statistics { size: size as usize, max_size: self.config.max_size })
    }

    pub fn get_telemetry(&self) -> L2Telemetry {
        self.telemetry.lock().unwrap().snapshot()
    }

    pub fn clear(&self) -> Result<(), L2Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM l2_entries", []).map_err(to_l2_err)?;
        Ok(())
    }
}
