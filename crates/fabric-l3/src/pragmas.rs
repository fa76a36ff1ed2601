//! PRAGMA configuration applied to every connection this store opens.

use rusqlite::Connection;

use fabric_core::errors::L3Error;

fn to_l3_err(e: impl std::fmt::Display) -> L3Error {
    L3Error::SqliteError { message: e.to_string() }
}

/// WAL mode, NORMAL sync, a 5s busy timeout. Mirrors the pragma set used for the
/// other SQLite-backed tiers in this workspace.
pub fn apply_pragmas(conn: &Connection) -> Result<(), L3Error> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        PRAGMA foreign_keys = ON;
        ",
    )
    .map_err(to_l3_err)?;
    Ok(())
}

pub fn apply_read_pragmas(conn: &Connection) -> Result<(), L3Error> {
    conn.execute_batch(
        "
        PRAGMA busy_timeout = 5000;
        PRAGMA query_only = ON;
        ",
    )
    .map_err(to_l3_err)?;
    Ok(())
}
