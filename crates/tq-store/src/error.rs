//! Storage errors

use rusqlite::ErrorCode;

/// Errors raised by the SQLite store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Lock wait (in-process handle or SQLite writer lock) exceeded the busy timeout
    #[error("storage busy: {0}")]
    Busy(String),

    /// Caller deadline passed; the transaction was rolled back
    #[error("deadline exceeded before {0}")]
    DeadlineExceeded(&'static str),

    /// Unique index rejected a row
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Other constraint or trigger rejected a write
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// A stored value could not be mapped back into a domain type
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Underlying SQLite failure
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    /// Database directory could not be prepared
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON column encoding failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Retrying the same operation later may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_) | Self::DeadlineExceeded(_))
    }

    /// Construct a corrupt-row error
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ffi, ref msg) = err {
            let detail = msg.clone().unwrap_or_else(|| ffi.to_string());
            match ffi.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    return Self::Busy(detail);
                }
                ErrorCode::ConstraintViolation
                    if ffi.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    return Self::UniqueViolation(detail);
                }
                ErrorCode::ConstraintViolation => return Self::Constraint(detail),
                _ => {}
            }
        }
        Self::Sqlite(err)
    }
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
