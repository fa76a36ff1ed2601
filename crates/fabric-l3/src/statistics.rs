/// Snapshot of store-wide counters (`get_statistics`).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct L3Statistics {
    pub total_concepts: u64,
    pub total_commits: u64,
    pub total_aborts: u64,
    pub total_conflicts: u64,
}
