use fabric_coordinator::CoordinatorStatistics;
use fabric_l1::L1Statistics;
use fabric_l2::L2Statistics;
use fabric_l3::L3Statistics;
use fabric_outbox::OutboxStatistics;

/// `get_cache_statistics()`'s return shape: a snapshot across every tier plus
/// the coordinator. Never fails to build — a tier that can't answer reports
/// its zero value rather than aborting the whole snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatisticsReport {
    pub l1: L1Statistics,
    pub l2: L2Statistics,
    pub l3: L3Statistics,
    pub outbox: OutboxStatistics,
    pub coordinator: CoordinatorStatistics,
}

/// `invalidate_concept(oid)`'s return shape: which tiers actually held
/// something. `l3` reports whether the ground-truth row still exists, since
/// invalidation never touches L3 — only an explicit delete does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct InvalidateResult {
    pub l1: bool,
    pub l2: bool,
    pub l3: bool,
}

/// `validate()`'s return shape: a structured report instead of a raised error,
/// so callers can check health without risking a call that aborts.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub issues: Vec<String>,
}
