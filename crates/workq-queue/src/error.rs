use thiserror::Error;
use workq_core::TaskError;
use workq_store::StoreError;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The backing store could not be reached; retryable
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The task could not be encoded or exceeds the size cap
    #[error(transparent)]
    Task(#[from] TaskError),
}

impl QueueError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
