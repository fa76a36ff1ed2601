//! # fabric
//!
//! The public façade: composes the vector primitives, the three cache tiers,
//! the transactional outbox, and the cache coordinator into a single
//! `Fabric` value that a caller constructs once and shares across threads.

mod facade;
mod input;
mod search;
mod shared_memory;
mod statistics;

pub use facade::Fabric;
pub use fabric_core::{
    Concept, ConceptDiff, Confidence, FabricConfig, FabricError, FabricResult, Metadata, MetadataValue, Oid, Relations,
};
pub use fabric_coordinator::PromotionResult;
pub use fabric_l2::L2Telemetry;
pub use input::NewConcept;
pub use search::{ConceptLookup, SearchHit, Tier};
pub use shared_memory::{SharedMemoryHandle, SharedMemoryRegion};
pub use statistics::{CacheStatisticsReport, InvalidateResult, ValidationReport};
