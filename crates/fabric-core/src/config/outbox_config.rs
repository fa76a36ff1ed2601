use serde::{Deserialize, Serialize};

/// Outbox tuning (`outbox.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    pub batch_size: usize,
    pub visibility_timeout_seconds: u64,
    pub retry_limit: u32,
    pub storage_path: String,
    /// Bounded capacity; `enqueue` applies backpressure once reached.
    pub capacity: usize,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            visibility_timeout_seconds: 30,
            retry_limit: 5,
            storage_path: "fabric-outbox.sqlite3".to_string(),
            capacity: 100_000,
        }
    }
}
