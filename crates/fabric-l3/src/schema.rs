use rusqlite::Connection;

use fabric_core::errors::L3Error;

fn to_l3_err(e: impl std::fmt::Display) -> L3Error {
    L3Error::SqliteError { message: e.to_string() }
}

/// Create the `concepts` table. Columns hold the JSON-serialized vector/metadata/
/// relations alongside queryable scalar columns (`confidence`, `created_at`,
/// `updated_at`) so statistics queries don't need to deserialize every row.
pub fn initialize(conn: &Connection) -> Result<(), L3Error> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS concepts (
            oid TEXT PRIMARY KEY,
            symbolic_vector TEXT,
            geometric_embedding TEXT NOT NULL,
            metadata TEXT NOT NULL,
            relations TEXT NOT NULL,
            confidence REAL NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_concepts_updated_at ON concepts (updated_at);
        ",
    )
    .map_err(to_l3_err)?;
    Ok(())
}
