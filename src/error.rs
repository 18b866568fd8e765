use thiserror::Error;

use crate::state_machine::{JobId, JobStatus};

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Job {job_id} is {status}; cannot {action}")]
    InvalidState {
        job_id: JobId,
        status: JobStatus,
        action: &'static str,
    },

    #[error("Job {0} already accepted by another translator")]
    Conflict(JobId),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl BookingError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// True for failures caused by the request rather than by the service.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, BookingError::Store(_))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}
