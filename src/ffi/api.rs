//! The exported C functions.
//!
//! Two families share one implementation:
//!
//! * the process-wide engine (`initialize_engine`, `execute_query`,
//!   `start_import`, `cancel_import`), installed by [`initialize_engine`] and
//!   replaced atomically on every successful call;
//! * explicit handles (`local_disc_*`), any number of which can coexist.
//!
//! # Safety contract
//!
//! * Pointer parameters are checked for null before dereference.
//! * Panics are caught with [`std::panic::catch_unwind`] and reported as
//!   [`ErrorCode::Internal`].
//! * The last error message and code live in thread-local storage and are
//!   overwritten by the next call on the same thread.

use std::cell::{Cell, RefCell};
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::panic::AssertUnwindSafe;
use std::ptr;
use std::sync::{Arc, PoisonError, RwLock};

use super::types::{ErrorCode, ImportProgressCallback, LocalDiscHandle};
use crate::engine::{Engine, QueryOutput};
use crate::error::{EngineError, Result};
use crate::import::ImportRequest;
use crate::import::progress::{ImportProgress, ProgressSink, Silent};
use crate::logging;

static ENGINE: RwLock<Option<Arc<Engine>>> = RwLock::new(None);

static VERSION_C: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
    static LAST_CODE: Cell<c_int> = const { Cell::new(0) };
}

// ---------------------------------------------------------------------------
// Error bookkeeping
// ---------------------------------------------------------------------------

fn set_last_error(code: ErrorCode, msg: &str) -> c_int {
    let c = CString::new(msg.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|cell| *cell.borrow_mut() = Some(c));
    LAST_CODE.with(|cell| cell.set(code.as_int()));
    code.as_int()
}

fn clear_last_error() {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = None);
    LAST_CODE.with(|cell| cell.set(ErrorCode::Ok.as_int()));
}

fn fail(err: &EngineError, code: ErrorCode) -> c_int {
    set_last_error(code, &err.to_string())
}

/// Run `f`, turning a panic into `fallback` plus an `Internal` last error.
fn guarded<T>(name: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    std::panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        set_last_error(ErrorCode::Internal, &format!("panic during {name}"));
        fallback
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Borrow a NUL-terminated UTF-8 argument.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn cstr_arg<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(EngineError::InvalidArgument(format!("{what} is null")));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| EngineError::InvalidArgument(format!("{what} is not valid UTF-8")))
}

/// # Safety
///
/// `handle` must be null or a live pointer from [`local_disc_open`].
unsafe fn handle_engine(handle: *const LocalDiscHandle) -> Result<Arc<Engine>> {
    if handle.is_null() {
        return Err(EngineError::InvalidArgument("handle is null".to_string()));
    }
    Ok(unsafe { &*handle }.engine.clone())
}

fn global_engine() -> Result<Arc<Engine>> {
    ENGINE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or(EngineError::NotReady)
}

unsafe fn open_engine(connection: *const c_char) -> Result<Engine> {
    let connection = unsafe { cstr_arg(connection, "connection string") }?;
    if connection.trim().is_empty() {
        return Err(EngineError::InvalidArgument(
            "connection string is empty".to_string(),
        ));
    }
    Engine::open(connection)
}

fn into_c_result(result: Result<QueryOutput>) -> *mut c_char {
    let text = result.and_then(|output| output.to_json()).and_then(|json| {
        CString::new(json).map_err(|e| EngineError::Internal(e.to_string()))
    });
    match text {
        Ok(text) => {
            clear_last_error();
            text.into_raw()
        }
        Err(e) => {
            fail(&e, ErrorCode::from_engine_error(&e));
            ptr::null_mut()
        }
    }
}

/// Forwards progress reports to a C callback.
struct CallbackSink {
    callback: extern "C" fn(c_int, *const c_char),
}

impl ProgressSink for CallbackSink {
    fn report(&mut self, progress: &ImportProgress) {
        let message = CString::new(progress.message.replace('\0', " ")).unwrap_or_default();
        (self.callback)(c_int::from(progress.percentage), message.as_ptr());
    }
}

/// Validate arguments, then import. Nothing reaches `callback` unless the
/// arguments are valid.
unsafe fn run_import(
    engine: Result<Arc<Engine>>,
    platform: *const c_char,
    path: *const c_char,
    callback: ImportProgressCallback,
) -> c_int {
    let prepared = engine.and_then(|engine| {
        let platform = unsafe { cstr_arg(platform, "platform") }?;
        let path = unsafe { cstr_arg(path, "path") }?;
        if path.is_empty() {
            return Err(EngineError::InvalidArgument("path is empty".to_string()));
        }
        Ok((engine, ImportRequest::new(platform, path)))
    });
    let (engine, request) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => return fail(&e, ErrorCode::from_engine_error(&e)),
    };

    let result = match callback {
        Some(callback) => engine.import(&request, &mut CallbackSink { callback }),
        None => engine.import(&request, &mut Silent),
    };
    match result {
        Ok(_) => {
            clear_last_error();
            ErrorCode::Ok.as_int()
        }
        Err(e) => fail(&e, ErrorCode::for_import(&e)),
    }
}

fn cancel(engine: Result<Arc<Engine>>) -> c_int {
    match engine.and_then(|engine| engine.cancel_import()) {
        Ok(_) => {
            clear_last_error();
            ErrorCode::Ok.as_int()
        }
        Err(e) => fail(&e, ErrorCode::from_engine_error(&e)),
    }
}

// ---------------------------------------------------------------------------
// Process-wide engine
// ---------------------------------------------------------------------------

/// Connect the process-wide engine.
///
/// Returns `0` on success or a negative [`ErrorCode`]. On failure any
/// previously installed engine stays in place.
///
/// # Safety
///
/// `connection` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn initialize_engine(connection: *const c_char) -> c_int {
    guarded("initialize_engine", ErrorCode::Internal.as_int(), || {
        logging::init_from_env();
        match unsafe { open_engine(connection) } {
            Ok(engine) => {
                *ENGINE.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(engine));
                clear_last_error();
                ErrorCode::Ok.as_int()
            }
            Err(e) => fail(&e, ErrorCode::from_engine_error(&e)),
        }
    })
}

/// The library version. The pointer is static: identical on every call and
/// never to be freed.
#[unsafe(no_mangle)]
pub extern "C" fn get_engine_version() -> *const c_char {
    VERSION_C.as_ptr().cast()
}

/// Run one SQL statement on the process-wide engine.
///
/// Returns NUL-terminated JSON owned by the caller, to be released with
/// [`free_query_result`], or null on failure.
///
/// # Safety
///
/// `query` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn execute_query(query: *const c_char) -> *mut c_char {
    guarded("execute_query", ptr::null_mut(), || {
        let result = global_engine().and_then(|engine| {
            let query = unsafe { cstr_arg(query, "query") }?;
            engine.execute(query)
        });
        into_c_result(result)
    })
}

/// Release a result from [`execute_query`] or [`local_disc_execute`].
/// Null is a no-op.
///
/// # Safety
///
/// `result` must be null or a pointer returned by one of those functions
/// that has not been released yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free_query_result(result: *mut c_char) {
    if result.is_null() {
        return;
    }
    let _ = std::panic::catch_unwind(AssertUnwindSafe(|| {
        drop(unsafe { CString::from_raw(result) });
    }));
}

/// Import a dump file into the process-wide engine, reporting progress to
/// `callback` (which may be null) on the calling thread.
///
/// # Safety
///
/// `platform` and `path` must be null or NUL-terminated strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn start_import(
    platform: *const c_char,
    path: *const c_char,
    callback: ImportProgressCallback,
) -> c_int {
    guarded("start_import", ErrorCode::Internal.as_int(), || unsafe {
        run_import(global_engine(), platform, path, callback)
    })
}

/// Ask the process-wide engine's running import to stop. Succeeds whether or
/// not an import is running.
#[unsafe(no_mangle)]
pub extern "C" fn cancel_import() -> c_int {
    guarded("cancel_import", ErrorCode::Internal.as_int(), || {
        cancel(global_engine())
    })
}

/// Message of the last failure on this thread, or null after a success.
/// Valid until the next call into this library on the same thread.
#[unsafe(no_mangle)]
pub extern "C" fn get_last_error() -> *const c_char {
    LAST_ERROR.with(|cell| {
        cell.borrow()
            .as_ref()
            .map_or(ptr::null(), |msg| msg.as_ptr())
    })
}

/// Code of the last call on this thread; `0` after a success.
#[unsafe(no_mangle)]
pub extern "C" fn get_last_error_code() -> c_int {
    LAST_CODE.with(Cell::get)
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Open an independent engine. Returns null on failure.
///
/// # Safety
///
/// `connection` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn local_disc_open(connection: *const c_char) -> *mut LocalDiscHandle {
    guarded("local_disc_open", ptr::null_mut(), || {
        logging::init_from_env();
        match unsafe { open_engine(connection) } {
            Ok(engine) => {
                clear_last_error();
                LocalDiscHandle::into_raw(engine)
            }
            Err(e) => {
                fail(&e, ErrorCode::from_engine_error(&e));
                ptr::null_mut()
            }
        }
    })
}

/// Close a handle. Null is a no-op. An import running on another thread
/// keeps the engine alive until it finishes.
///
/// # Safety
///
/// `handle` must be null or a pointer from [`local_disc_open`] that has not
/// been closed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn local_disc_close(handle: *mut LocalDiscHandle) {
    if handle.is_null() {
        return;
    }
    let _ = std::panic::catch_unwind(AssertUnwindSafe(|| {
        drop(unsafe { Box::from_raw(handle) });
    }));
}

/// [`execute_query`] on a handle.
///
/// # Safety
///
/// `handle` must be null or live; `query` must be null or NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn local_disc_execute(
    handle: *const LocalDiscHandle,
    query: *const c_char,
) -> *mut c_char {
    guarded("local_disc_execute", ptr::null_mut(), || {
        let result = unsafe { handle_engine(handle) }.and_then(|engine| {
            let query = unsafe { cstr_arg(query, "query") }?;
            engine.execute(query)
        });
        into_c_result(result)
    })
}

/// [`start_import`] on a handle.
///
/// # Safety
///
/// `handle` must be null or live; `platform` and `path` must be null or
/// NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn local_disc_import(
    handle: *const LocalDiscHandle,
    platform: *const c_char,
    path: *const c_char,
    callback: ImportProgressCallback,
) -> c_int {
    guarded("local_disc_import", ErrorCode::Internal.as_int(), || unsafe {
        run_import(handle_engine(handle), platform, path, callback)
    })
}

/// [`cancel_import`] on a handle.
///
/// # Safety
///
/// `handle` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn local_disc_cancel(handle: *const LocalDiscHandle) -> c_int {
    guarded("local_disc_cancel", ErrorCode::Internal.as_int(), || {
        cancel(unsafe { handle_engine(handle) })
    })
}
