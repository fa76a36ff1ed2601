//! # fabric-core
//!
//! Foundation crate for the memory fabric. Defines the `Concept` data model,
//! the layered error taxonomy, configuration structs, and shared constants.
//! Every other crate in the workspace depends on this one.

pub mod concept;
pub mod config;
pub mod constants;
pub mod errors;

pub use concept::{Concept, ConceptDiff, Confidence, Metadata, MetadataValue, Oid, Relations};
pub use config::FabricConfig;
pub use errors::{FabricError, FabricResult};
