//! Layered configuration. `FabricConfig` composes one config struct per component,
//! each `serde`-derived with `#[serde(default)]` so a partial TOML document is valid.

mod coordinator_config;
mod l1_config;
mod l2_config;
mod l3_config;
mod outbox_config;
mod promotion_config;

pub use coordinator_config::CoordinatorConfig;
pub use l1_config::L1Config;
pub use l2_config::L2Config;
pub use l3_config::L3Config;
pub use outbox_config::OutboxConfig;
pub use promotion_config::PromotionConfig;

use crate::errors::FabricError;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    pub l1: L1Config,
    pub l2: L2Config,
    pub l3: L3Config,
    pub coordinator: CoordinatorConfig,
    pub outbox: OutboxConfig,
    pub promotions: PromotionConfig,
}

impl FabricConfig {
    /// Parse a TOML document into a config, then validate it.
    pub fn from_toml_str(s: &str) -> Result<Self, FabricError> {
        let config: Self =
            toml::from_str(s).map_err(|e| FabricError::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation that `serde`'s `Default` derivation can't express.
    /// A bad configuration is fatal at initialize, surfaced to the caller.
    pub fn validate(&self) -> Result<(), FabricError> {
        if self.l1.vector_dim == 0 {
            return Err(FabricError::configuration("l1.vector_dim must be > 0"));
        }
        if self.l2.vector_dim == 0 {
            return Err(FabricError::configuration("l2.vector_dim must be > 0"));
        }
        if self.l1.vector_dim != self.l2.vector_dim {
            return Err(FabricError::configuration(format!(
                "l1.vector_dim ({}) must match l2.vector_dim ({})",
                self.l1.vector_dim, self.l2.vector_dim
            )));
        }
        if self.l1.max_size == 0 {
            return Err(FabricError::configuration("l1.max_size must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.l1.eviction_threshold) || self.l1.eviction_threshold <= 0.0
        {
            return Err(FabricError::configuration(
                "l1.eviction_threshold must be in (0, 1]",
            ));
        }
        if self.l1.eviction_low_water_mark <= 0.0
            || self.l1.eviction_low_water_mark >= self.l1.eviction_threshold
        {
            return Err(FabricError::configuration(
                "l1.eviction_low_water_mark must be in (0, l1.eviction_threshold)",
            ));
        }
        if !(0.0..=1.0).contains(&self.l1.lfu_lru_alpha) {
            return Err(FabricError::configuration("l1.lfu_lru_alpha must be in [0, 1]"));
        }
        if self.l2.storage_path.is_empty() {
            return Err(FabricError::configuration("l2.storage_path must not be empty"));
        }
        if self.l3.storage_path.is_empty() {
            return Err(FabricError::configuration("l3.storage_path must not be empty"));
        }
        if self.coordinator.workers == 0 {
            return Err(FabricError::configuration("coordinator.workers must be > 0"));
        }
        if self.outbox.retry_limit == 0 {
            return Err(FabricError::configuration("outbox.retry_limit must be > 0"));
        }
        if self.outbox.capacity == 0 {
            return Err(FabricError::configuration("outbox.capacity must be > 0"));
        }
        Ok(())
    }
}
