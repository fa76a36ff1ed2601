//! Layered error taxonomy. Each subsystem gets its own `thiserror` enum; this module
//! wraps all of them into one top-level error plus the cross-cutting kinds that don't
//! belong to a single subsystem (`ConfigurationError`, `ResourceError`).

mod coordinator_error;
mod l1_error;
mod l2_error;
mod l3_error;
mod outbox_error;
mod promotion_error;
mod vector_error;

pub use coordinator_error::CoordinatorError;
pub use l1_error::L1Error;
pub use l2_error::L2Error;
pub use l3_error::L3Error;
pub use outbox_error::OutboxError;
pub use promotion_error::{PromotionError, PromotionFailureReason};
pub use vector_error::VectorError;

/// Top-level error for the fabric crate. Every subsystem error converts into this via
/// `#[from]`; callers that only care about one subsystem should match on that
/// subsystem's enum instead of this one.
#[derive(Debug, thiserror::Error)]
pub enum FabricError {
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("resource error: {0}")]
    ResourceError(String),

    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error(transparent)]
    L1(#[from] L1Error),

    #[error(transparent)]
    L2(#[from] L2Error),

    #[error(transparent)]
    L3(#[from] L3Error),

    #[error(transparent)]
    Outbox(#[from] OutboxError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Promotion(#[from] PromotionError),
}

impl FabricError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::ResourceError(msg.into())
    }
}

pub type FabricResult<T> = Result<T, FabricError>;
