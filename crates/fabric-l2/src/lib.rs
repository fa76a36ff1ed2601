//! L2 warm cache: a disk-backed, persistent tier between the in-memory L1
//! working set and the authoritative L3 ground truth. Slower than L1, far faster than a
//! full L3 scan, and durable across restarts.

mod cache;
mod schema;
mod telemetry;

pub use cache::{L2Cache, L2Entry, L2Statistics};
pub use telemetry::{AnnUsage, EvictionRecord, L2Telemetry, SearchMetrics};
