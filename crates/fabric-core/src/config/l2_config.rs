use serde::{Deserialize, Serialize};

/// L2 warm cache sizing and disk location (`l2.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct L2Config {
    pub storage_path: String,
    pub max_size: usize,
    pub vector_dim: usize,
    /// Capacity of the bounded in-memory eviction-history ring used for telemetry.
    pub eviction_history_capacity: usize,
}

impl Default for L2Config {
    fn default() -> Self {
        Self {
            storage_path: "fabric-l2.sqlite3".to_string(),
            max_size: 16_384,
            vector_dim: 128,
            eviction_history_capacity: 256,
        }
    }
}
