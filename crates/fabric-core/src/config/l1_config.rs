use serde::{Deserialize, Serialize};

/// L1 working-set cache sizing and eviction policy (`l1.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct L1Config {
    pub max_size: usize,
    pub vector_dim: usize,
    pub index_type: String,
    /// Eviction triggers once `size >= eviction_threshold * max_size`.
    pub eviction_threshold: f64,
    /// Eviction runs until `size` drops below `low_water_mark * max_size`.
    pub eviction_low_water_mark: f64,
    pub promotion_threshold: u32,
    pub promotion_requeue_step: u32,
    /// Weight given to frequency vs. recency in the hybrid eviction score
    /// (`score = alpha * frequency_percentile + (1 - alpha) * recency_percentile`).
    pub lfu_lru_alpha: f64,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            max_size: 1024,
            vector_dim: 128,
            index_type: "flat".to_string(),
            eviction_threshold: 0.9,
            eviction_low_water_mark: 0.75,
            promotion_threshold: 5,
            promotion_requeue_step: 2,
            lfu_lru_alpha: 0.5,
        }
    }
}
