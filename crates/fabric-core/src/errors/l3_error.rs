/// Errors from the L3 ground-truth store (§4.4).
#[derive(Debug, thiserror::Error)]
pub enum L3Error {
    #[error("sqlite error: {message}")]
    SqliteError { message: String },

    #[error("migration failed at version {version}: {reason}")]
    MigrationFailed { version: u32, reason: String },

    #[error("conflicting transaction for oid {oid}")]
    ConflictError { oid: String },

    #[error("store is read-only")]
    ReadOnly,

    #[error("no open transaction to commit/abort")]
    NoOpenTransaction,

    #[error("injected fault: {0}")]
    InjectedFault(String),
}
