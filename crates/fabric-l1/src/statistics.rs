/// Snapshot of L1 state for the façade's `get_cache_statistics()`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct L1Statistics {
    pub size: usize,
    pub max_size: usize,
    pub promotion_queue_len: usize,
    pub total_puts: u64,
    pub total_gets: u64,
    pub total_evictions: u64,
    pub total_promotions_triggered: u64,
}
