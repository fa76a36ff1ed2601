/// Errors from the L2 warm cache (§4.3).
#[derive(Debug, thiserror::Error)]
pub enum L2Error {
    #[error("dimension mismatch: L2 expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("sqlite error: {message}")]
    SqliteError { message: String },

    #[error("index/sidecar out of sync for oid {oid}: {details}")]
    SidecarInconsistent { oid: String, details: String },
}
