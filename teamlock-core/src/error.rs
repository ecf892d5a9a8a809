//! Error types for teamlock-core

use thiserror::Error;

/// Failures surfaced by backing-store implementations.
///
/// Public lock operations never propagate these: the manager converts them
/// into failed `LockResult`s / `false` at its boundary and the system fails
/// closed ("can't confirm" means "can't grant").
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected or mangled an operation
    #[error("store backend error: {0}")]
    Backend(String),

    /// A persisted record could not be decoded
    #[error("corrupt record for key '{key}': {reason}")]
    CorruptRecord { key: String, reason: String },
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Errors for component lifecycle misuse
#[derive(Debug, Error)]
pub enum CoreError {
    /// Operation attempted before `initialize()` succeeded
    #[error("component used before initialization")]
    NotInitialized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, CoreError>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;
