/// Fabric crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bounded internal retry count for L3 `ConflictError` before it is surfaced to the caller.
pub const MAX_CONFLICT_RETRIES: u32 = 3;

/// Default capacity of L2's in-memory eviction-history ring when not overridden by config.
pub const DEFAULT_EVICTION_HISTORY_CAPACITY: usize = 256;
