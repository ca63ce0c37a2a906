use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Rate limit exceeded: at most {0} operations per window")]
    RateLimitExceeded(u32),
    #[error("No pooled connection became available within {0:?}")]
    PoolTimeout(Duration),
    #[error("Integrity check failed: {0}")]
    IntegrityError(String),
    #[error("Destructive operation requires confirm=\"{0}\"")]
    ConfirmationRequired(&'static str),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Snapshot schema version {found} is not supported (expected {supported})")]
    SchemaVersionMismatch { found: u32, supported: u32 },
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
}

impl MemoryError {
    /// Stable machine-readable code for the external envelope.
    pub fn code(&self) -> &'static str {
        match self {
            MemoryError::RusqliteError(_) | MemoryError::IoError(_) | MemoryError::StorageError(_) => {
                "storage_error"
            }
            MemoryError::ValidationError(_) => "validation_error",
            MemoryError::RateLimitExceeded(_) => "rate_limit_exceeded",
            MemoryError::PoolTimeout(_) => "pool_timeout",
            MemoryError::IntegrityError(_) => "integrity_error",
            MemoryError::ConfirmationRequired(_) => "confirmation_required",
            MemoryError::NotFound(_) => "not_found",
            MemoryError::SchemaVersionMismatch { .. } => "schema_version_mismatch",
            MemoryError::UnknownOperation(_) => "unknown_operation",
        }
    }

    /// Message safe to hand to an external caller. Engine failures are reduced
    /// to their SQLite error class so raw file paths and connection detail
    /// never leave the process.
    pub fn public_message(&self) -> String {
        match self {
            MemoryError::RusqliteError(rusqlite::Error::SqliteFailure(code, _)) => {
                format!("storage engine failure ({:?})", code.code)
            }
            MemoryError::RusqliteError(_) => "storage engine failure".to_string(),
            MemoryError::IoError(e) => format!("storage I/O failure ({:?})", e.kind()),
            other => other.to_string(),
        }
    }
}
