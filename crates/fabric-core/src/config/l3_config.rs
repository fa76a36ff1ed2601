use serde::{Deserialize, Serialize};

/// L3 ground-truth backing file and optional replica (`l3.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct L3Config {
    pub storage_path: String,
    pub read_only: bool,
    pub replica_address: Option<String>,
    /// Number of pooled read connections (file-backed mode only).
    pub read_pool_size: usize,
}

impl Default for L3Config {
    fn default() -> Self {
        Self {
            storage_path: "fabric-l3.sqlite3".to_string(),
            read_only: false,
            replica_address: None,
            read_pool_size: 4,
        }
    }
}
