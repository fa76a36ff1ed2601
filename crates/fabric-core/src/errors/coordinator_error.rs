/// Errors from the cache coordinator (§4.6).
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("coordinator is stopped")]
    CoordinatorStopped,

    #[error("coordinator already running")]
    AlreadyRunning,

    #[error("worker pool failed to drain within the shutdown deadline")]
    ShutdownTimedOut,
}
