use crate::state::CoordinatorState;

#[derive(Debug, Clone, serde::Serialize)]
pub struct CoordinatorStatistics {
    pub state: &'static str,
    pub workers: usize,
    pub total_processed: u64,
    pub total_failed: u64,
    pub total_dlq: u64,
}

impl CoordinatorStatistics {
    pub(crate) fn state_label(state: CoordinatorState) -> &'static str {
        match state {
            CoordinatorState::Stopped => "stopped",
            CoordinatorState::Running => "running",
            CoordinatorState::Crashed => "crashed",
        }
    }
}
