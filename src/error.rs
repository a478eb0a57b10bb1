use thiserror::Error;

/// Errors surfaced by the reconciliation engine.
///
/// Transient failures (`Transfer`, `Hashing`) are not retried here; the next
/// differ sweep observes ground truth and re-admits what still needs doing.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("failed to hash {path}: {source}")]
    Hashing {
        path: String,
        source: std::io::Error,
    },

    #[error("content rejected by remote policy: {0}")]
    Illegal(String),

    #[error("source vanished before execution: {0}")]
    NotExisted(String),

    #[error("engine already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
