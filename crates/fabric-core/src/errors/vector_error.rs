/// Errors from the vector store primitives (§4.1).
#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
