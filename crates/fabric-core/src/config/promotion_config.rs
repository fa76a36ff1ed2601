use serde::{Deserialize, Serialize};

/// Promotion daemon tuning (`promotions.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub batch_limit: usize,
    pub include_vectors: bool,
    pub notify_coordinator: bool,
    pub idle_sleep_seconds: u64,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: 30,
            batch_limit: 64,
            include_vectors: true,
            notify_coordinator: true,
            idle_sleep_seconds: 1,
        }
    }
}
