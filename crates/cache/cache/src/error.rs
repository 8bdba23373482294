use thiserror::Error;

/// Errors from cache store and lock operations.
///
/// Losing a lock race or failing an ownership check is not an error; those
/// outcomes are reported as `Ok(false)`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("lock not acquired within {0:?}")]
    LockTimeout(std::time::Duration),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
