/// Errors from the transactional outbox (§4.5).
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("sqlite error: {message}")]
    SqliteError { message: String },

    #[error("entry {id} exhausted its retry budget and moved to the dead-letter queue")]
    OutboxExhausted { id: i64 },

    #[error("entry {id} not found or not in an expected state")]
    NotFound { id: i64 },

    #[error("outbox is at capacity ({capacity}); enqueue must block or be retried")]
    AtCapacity { capacity: usize },
}
