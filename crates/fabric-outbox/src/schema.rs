use rusqlite::Connection;

use fabric_core::errors::OutboxError;

fn to_outbox_err(e: impl std::fmt::Display) -> OutboxError {
    OutboxError::SqliteError { message: e.to_string() }
}

/// Apply pragmas and create the outbox table. Colocated with L3: when the
/// fabric façade wires a file-backed L3, it points the outbox at the same database
/// file, so this schema is created on the very connection L3 commits through.
pub fn initialize(conn: &Connection) -> Result<(), OutboxError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        CREATE TABLE IF NOT EXISTS outbox_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            oid TEXT NOT NULL,
            payload TEXT NOT NULL,
            headers TEXT,
            enqueue_time TEXT NOT NULL,
            visible_after TEXT,
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL,
            state TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_outbox_state_id ON outbox_entries (state, id);
        ",
    )
    .map_err(to_outbox_err)?;
    Ok(())
}
