use serde::{Deserialize, Serialize};

/// Worker pool sizing and tier gating (`coordinator.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub workers: usize,
    pub auto_restart: bool,
    pub enable_l1: bool,
    pub enable_l2: bool,
    pub enable_l3: bool,
    /// How long an idle worker sleeps after reserving an empty batch.
    pub idle_sleep_seconds: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            auto_restart: true,
            enable_l1: true,
            enable_l2: true,
            enable_l3: true,
            idle_sleep_seconds: 1,
        }
    }
}
