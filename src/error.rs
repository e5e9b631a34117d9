use thiserror::Error;

/// Everything that can go wrong inside the engine.
///
/// The C boundary flattens these into [`ErrorCode`](crate::ffi::types::ErrorCode)
/// values; Rust callers get the full variant.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("engine is not initialized")]
    NotReady,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed dump at line {line}: {reason}")]
    MalformedDump { line: usize, reason: String },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("import cancelled")]
    Cancelled,
    #[error("engine is busy with an import on this thread")]
    Busy,
    #[error("engine lock poisoned")]
    Poisoned,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// True for failures of the connection itself rather than of one statement.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Poisoned => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::NotADatabase
                    | rusqlite::ErrorCode::DatabaseCorrupt
                    | rusqlite::ErrorCode::SystemIoFailure
                    | rusqlite::ErrorCode::PermissionDenied
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
