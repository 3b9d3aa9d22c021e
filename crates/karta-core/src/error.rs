use thiserror::Error;

use crate::oracle::OracleError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("unknown card token")]
    UnknownCardToken,

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("submission queue rejected the job")]
    QueueFull,

    #[error("decision deadline exceeded")]
    DeadlineExceeded,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
