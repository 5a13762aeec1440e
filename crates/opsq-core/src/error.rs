use thiserror::Error;

use crate::domain::JobStatus;

/// Errors returned by the job store operations.
///
/// Handler failures never show up here: they are recorded as text on the
/// job row (`last_error`). These variants are structural problems with a
/// call, or the store itself being unavailable.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid job_type {0:?}")]
    InvalidJobType(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("status {0} cannot be reported by a worker (expected completed or failed)")]
    InvalidStatusTransition(JobStatus),

    #[error("job store busy: lock not acquired within {0:?}")]
    StoreBusy(std::time::Duration),

    #[error("storage error: {0}")]
    Storage(String),
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        QueueError::Storage(err.to_string())
    }
}
