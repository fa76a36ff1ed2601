use serde::{Deserialize, Serialize};

/// Why a single promotion candidate failed to land in L2. The string form of each
/// variant is also the key used in `PromotionResult::failure_reasons`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionFailureReason {
    MissingVector,
    CoordinatorPutFailed,
    CoordinatorPutRejected,
    L2PutFailed,
}

impl PromotionFailureReason {
    pub fn as_key(self) -> &'static str {
        match self {
            Self::MissingVector => "missing_vector",
            Self::CoordinatorPutFailed => "coordinator_put_failed",
            Self::CoordinatorPutRejected => "coordinator_put_rejected",
            Self::L2PutFailed => "l2_put_failed",
        }
    }
}

impl std::fmt::Display for PromotionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_key())
    }
}

/// Errors from the promotion pipeline (§4.7). Individual candidate failures are not
/// propagated as errors — they are recorded in `PromotionResult` — this enum covers
/// failures of the pipeline itself (e.g. L1 unreachable).
#[derive(Debug, thiserror::Error)]
pub enum PromotionError {
    #[error("L1 cache unreachable while draining promotions: {0}")]
    L1Unreachable(String),
}
