//! Error Translator: [`BridgeError`] to engine status codes and back.
//!
//! Engine convention: a failing callback returns a status code and leaves a
//! message allocated with `sqlite3_malloc` in the object the call was made
//! on (`zErrMsg` of a table, the `pzErr` out-parameter of the handshake, or
//! the result of a column context). The engine frees those messages itself.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;

use rusqlite::ffi;
use tablebridge_core::{BridgeError, ErrorKind, Result};
use tracing::debug;

/// Maps an error onto the nearest engine status code.
///
/// Engine errors keep their original (possibly extended) code; kinds
/// without a closer match become `SQLITE_ERROR`.
pub fn status_code(err: &BridgeError) -> c_int {
    if let BridgeError::Engine { code, .. } = err
        && *code != ffi::SQLITE_OK
    {
        return *code;
    }
    match err.kind() {
        ErrorKind::Constraint => ffi::SQLITE_CONSTRAINT,
        ErrorKind::Busy => ffi::SQLITE_BUSY,
        ErrorKind::NoMemory => ffi::SQLITE_NOMEM,
        ErrorKind::TooBig => ffi::SQLITE_TOOBIG,
        ErrorKind::Misuse => ffi::SQLITE_MISUSE,
        ErrorKind::Construction
        | ErrorKind::Planning
        | ErrorKind::Execution
        | ErrorKind::Generic => ffi::SQLITE_ERROR,
    }
}

/// Classifies an engine status code. Extended codes are classified by their
/// primary code.
pub fn classify(code: c_int) -> ErrorKind {
    match code & 0xff {
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => ErrorKind::Busy,
        ffi::SQLITE_NOMEM => ErrorKind::NoMemory,
        ffi::SQLITE_TOOBIG => ErrorKind::TooBig,
        ffi::SQLITE_MISUSE => ErrorKind::Misuse,
        ffi::SQLITE_CONSTRAINT => ErrorKind::Constraint,
        _ => ErrorKind::Generic,
    }
}

/// Wraps a failed engine call as a local error.
pub fn engine_error(code: c_int, message: Option<String>) -> BridgeError {
    let message = message.unwrap_or_else(|| {
        // SAFETY: sqlite3_errstr returns a static string for any code.
        let text = unsafe { ffi::sqlite3_errstr(code) };
        if text.is_null() {
            format!("engine error {code}")
        } else {
            unsafe { CStr::from_ptr(text) }
                .to_string_lossy()
                .into_owned()
        }
    });
    BridgeError::Engine {
        kind: classify(code),
        code,
        message,
    }
}

/// Reads the most recent error message of a connection.
///
/// # Safety
///
/// `db` must be a live connection handle.
pub(crate) unsafe fn last_message(db: *mut ffi::sqlite3) -> Option<String> {
    let text = unsafe { ffi::sqlite3_errmsg(db) };
    if text.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned())
}

/// Copies `text` into memory from `sqlite3_malloc`, stopping at the first
/// NUL. Returns null if the allocation fails.
pub(crate) fn alloc_text(text: &str) -> *mut c_char {
    let bytes = text.as_bytes();
    let bytes = match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    };
    // SAFETY: the buffer is len + 1 bytes and both copies stay inside it.
    unsafe {
        let buf = ffi::sqlite3_malloc64(bytes.len() as u64 + 1).cast::<c_char>();
        if buf.is_null() {
            return ptr::null_mut();
        }
        ptr::copy_nonoverlapping(bytes.as_ptr().cast::<c_char>(), buf, bytes.len());
        *buf.add(bytes.len()) = 0;
        buf
    }
}

/// Reports `err` on a table handle, replacing any previous message.
///
/// # Safety
///
/// `vtab` must point at a live `sqlite3_vtab`.
pub(crate) unsafe fn report_table(vtab: *mut ffi::sqlite3_vtab, err: &BridgeError) -> c_int {
    let code = status_code(err);
    debug!(rc = code, error = %err, "reporting table error");
    unsafe {
        let base = &mut *vtab;
        if !base.zErrMsg.is_null() {
            ffi::sqlite3_free(base.zErrMsg.cast::<c_void>());
        }
        base.zErrMsg = alloc_text(&err.to_string());
    }
    code
}

/// Reports `err` on the table that owns `cursor`.
///
/// # Safety
///
/// `cursor` must point at a live cursor whose `pVtab` has been set.
pub(crate) unsafe fn report_cursor(cursor: *mut ffi::sqlite3_vtab_cursor, err: &BridgeError) -> c_int {
    unsafe { report_table((*cursor).pVtab, err) }
}

/// Reports `err` through the handshake's `pzErr` out-parameter.
///
/// # Safety
///
/// `pz_err` must be null or valid for writes.
pub(crate) unsafe fn report_out(pz_err: *mut *mut c_char, err: &BridgeError) -> c_int {
    let code = status_code(err);
    debug!(rc = code, error = %err, "reporting handshake error");
    if !pz_err.is_null() {
        unsafe {
            if !(*pz_err).is_null() {
                ffi::sqlite3_free((*pz_err).cast::<c_void>());
            }
            *pz_err = alloc_text(&err.to_string());
        }
    }
    code
}

/// Reports `err` as the result of a column read.
///
/// # Safety
///
/// `ctx` must be the context passed to the current column callback.
pub(crate) unsafe fn report_context(ctx: *mut ffi::sqlite3_context, err: &BridgeError) -> c_int {
    let code = status_code(err);
    debug!(rc = code, error = %err, "reporting column error");
    unsafe {
        match err.kind() {
            ErrorKind::NoMemory => ffi::sqlite3_result_error_nomem(ctx),
            ErrorKind::TooBig => ffi::sqlite3_result_error_toobig(ctx),
            _ => {
                let message = err.to_string();
                ffi::sqlite3_result_error(
                    ctx,
                    message.as_ptr().cast::<c_char>(),
                    message.len() as c_int,
                );
                ffi::sqlite3_result_error_code(ctx, code);
            }
        }
    }
    code
}

/// Runs provider or cursor code, turning a panic into an execution error.
pub(crate) fn guard<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            Err(BridgeError::execution(format!("provider panicked: {detail}")))
        }
    }
}
