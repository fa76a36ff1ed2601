use rusqlite::Connection;

use fabric_core::errors::L2Error;

fn to_l2_err(e: impl std::fmt::Display) -> L2Error {
    L2Error::SqliteError { message: e.to_string() }
}

/// Apply pragmas and create the sidecar table. Mirrors the WAL/NORMAL pragma set the
/// ground-truth store uses, since L2 needs the same crash-durability guarantee for a
/// much smaller dataset.
pub fn initialize(conn: &Connection) -> Result<(), L2Error> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        CREATE TABLE IF NOT EXISTS l2_entries (
            oid TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            metadata TEXT NOT NULL,
            insert_time TEXT NOT NULL,
            last_access_time TEXT NOT NULL
        );
        ",
    )
    .map_err(to_l2_err)?;
    Ok(())
}
