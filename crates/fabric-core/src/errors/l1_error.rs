/// Errors from the L1 working-set cache (§4.2).
#[derive(Debug, thiserror::Error)]
pub enum L1Error {
    #[error("dimension mismatch: L1 expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
