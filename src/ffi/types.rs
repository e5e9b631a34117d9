//! C-compatible types for the boundary.

use std::os::raw::{c_char, c_int};
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::EngineError;

/// Status codes returned by the C functions.
///
/// `0` is success; every failure is negative so callers checking `< 0`
/// need not know the individual codes. [`get_last_error`](super::api::get_last_error)
/// gives the message behind the most recent failure on the calling thread.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Ok = 0,
    /// Null pointer, non-UTF-8 text or an empty string.
    InvalidArgument = -1,
    /// No engine has been initialized.
    NotReady = -2,
    /// The connection could not be opened or broke.
    EngineFailure = -3,
    /// SQLite rejected the statement.
    QueryFailed = -4,
    Cancelled = -5,
    /// A panic or other internal fault was contained at the boundary.
    Internal = -6,
    /// The dump could not be read or applied.
    ImportFailed = -7,
    /// Called from a progress callback into the engine that is importing.
    Busy = -8,
}

impl ErrorCode {
    pub fn from_engine_error(err: &EngineError) -> Self {
        if err.is_connection_failure() {
            return Self::EngineFailure;
        }
        match err {
            EngineError::InvalidArgument(_) => Self::InvalidArgument,
            EngineError::NotReady => Self::NotReady,
            EngineError::Connection(_) | EngineError::Poisoned | EngineError::Config(_) => {
                Self::EngineFailure
            }
            EngineError::Sqlite(_) => Self::QueryFailed,
            EngineError::Io(_)
            | EngineError::MalformedDump { .. }
            | EngineError::Csv(_)
            | EngineError::Json(_) => Self::ImportFailed,
            EngineError::Cancelled => Self::Cancelled,
            EngineError::Busy => Self::Busy,
            EngineError::Internal(_) => Self::Internal,
        }
    }

    /// Like [`ErrorCode::from_engine_error`], but statement errors raised while
    /// applying a dump count as import failures.
    pub fn for_import(err: &EngineError) -> Self {
        match Self::from_engine_error(err) {
            Self::QueryFailed => Self::ImportFailed,
            code => code,
        }
    }

    pub fn as_int(self) -> c_int {
        self as c_int
    }
}

/// Progress callback: `percentage` in 0..=100 and a NUL-terminated message
/// that is only valid for the duration of the call.
pub type ImportProgressCallback = Option<extern "C" fn(percentage: c_int, message: *const c_char)>;

/// Opaque engine handle for callers that want more than the process-wide
/// engine. Created by `local_disc_open`, freed by `local_disc_close`.
pub struct LocalDiscHandle {
    pub(crate) engine: Arc<Engine>,
}

impl LocalDiscHandle {
    pub(crate) fn into_raw(engine: Engine) -> *mut Self {
        Box::into_raw(Box::new(Self {
            engine: Arc::new(engine),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::Ok.as_int(), 0);
        assert_eq!(ErrorCode::InvalidArgument.as_int(), -1);
        assert_eq!(ErrorCode::NotReady.as_int(), -2);
        assert_eq!(ErrorCode::EngineFailure.as_int(), -3);
        assert_eq!(ErrorCode::QueryFailed.as_int(), -4);
        assert_eq!(ErrorCode::Cancelled.as_int(), -5);
        assert_eq!(ErrorCode::Internal.as_int(), -6);
        assert_eq!(ErrorCode::ImportFailed.as_int(), -7);
        assert_eq!(ErrorCode::Busy.as_int(), -8);
    }

    #[test]
    fn maps_engine_errors() {
        assert_eq!(
            ErrorCode::from_engine_error(&EngineError::NotReady),
            ErrorCode::NotReady
        );
        assert_eq!(
            ErrorCode::from_engine_error(&EngineError::Connection("x".into())),
            ErrorCode::EngineFailure
        );
        assert_eq!(
            ErrorCode::from_engine_error(&EngineError::Cancelled),
            ErrorCode::Cancelled
        );
        assert_eq!(ErrorCode::for_import(&EngineError::Busy), ErrorCode::Busy);
        assert_eq!(
            ErrorCode::from_engine_error(&EngineError::MalformedDump {
                line: 1,
                reason: "x".into()
            }),
            ErrorCode::ImportFailed
        );
    }

    #[test]
    fn statement_errors_depend_on_context() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err: EngineError = conn.execute("SELEC 1", []).unwrap_err().into();
        assert_eq!(ErrorCode::from_engine_error(&err), ErrorCode::QueryFailed);
        assert_eq!(ErrorCode::for_import(&err), ErrorCode::ImportFailed);
    }
}
