//! Marshaling between [`Value`] and the engine's native values.

use std::ffi::{c_char, c_int, c_void};
use std::slice;

use rusqlite::ffi;
use rusqlite::types::{Value as SqlValue, ValueRef};
use tablebridge_core::{BridgeError, Result, Value};

/// Reads a protected engine value (a `filter` argument).
///
/// # Safety
///
/// `value` must be a valid `sqlite3_value` for the duration of the call.
pub(crate) unsafe fn from_raw(value: *mut ffi::sqlite3_value) -> Result<Value> {
    unsafe {
        match ffi::sqlite3_value_type(value) {
            ffi::SQLITE_INTEGER => Ok(Value::Integer(ffi::sqlite3_value_int64(value))),
            ffi::SQLITE_FLOAT => Ok(Value::Real(ffi::sqlite3_value_double(value))),
            ffi::SQLITE_TEXT => {
                let text = ffi::sqlite3_value_text(value);
                let len = ffi::sqlite3_value_bytes(value);
                let bytes = raw_bytes(text.cast::<c_void>(), len)?;
                String::from_utf8(bytes.to_vec())
                    .map(Value::Text)
                    .map_err(|e| BridgeError::execution(format!("argument is not valid UTF-8: {e}")))
            }
            ffi::SQLITE_BLOB => {
                let blob = ffi::sqlite3_value_blob(value);
                let len = ffi::sqlite3_value_bytes(value);
                Ok(Value::Blob(raw_bytes(blob, len)?.to_vec()))
            }
            _ => Ok(Value::Null),
        }
    }
}

/// # Safety
///
/// `ptr` must be valid for `len` bytes when non-null.
unsafe fn raw_bytes<'a>(ptr: *const c_void, len: c_int) -> Result<&'a [u8]> {
    if len <= 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(BridgeError::NoMemory);
    }
    Ok(unsafe { slice::from_raw_parts(ptr.cast::<u8>(), len as usize) })
}

/// Sets `value` as the result of a column read. The engine copies text and
/// blob payloads before this returns.
///
/// # Safety
///
/// `ctx` must be the context passed to the current column callback.
pub(crate) unsafe fn set_result(ctx: *mut ffi::sqlite3_context, value: &Value) {
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_result_null(ctx),
            Value::Integer(i) => ffi::sqlite3_result_int64(ctx, *i),
            Value::Real(f) => ffi::sqlite3_result_double(ctx, *f),
            Value::Text(s) if s.is_empty() => ffi::sqlite3_result_text64(
                ctx,
                c"".as_ptr(),
                0,
                ffi::SQLITE_TRANSIENT(),
                ffi::SQLITE_UTF8 as u8,
            ),
            Value::Text(s) => ffi::sqlite3_result_text64(
                ctx,
                s.as_ptr().cast::<c_char>(),
                s.len() as u64,
                ffi::SQLITE_TRANSIENT(),
                ffi::SQLITE_UTF8 as u8,
            ),
            Value::Blob(b) if b.is_empty() => ffi::sqlite3_result_zeroblob(ctx, 0),
            Value::Blob(b) => ffi::sqlite3_result_blob64(
                ctx,
                b.as_ptr().cast::<c_void>(),
                b.len() as u64,
                ffi::SQLITE_TRANSIENT(),
            ),
        }
    }
}

/// Converts a row value into a rusqlite value, e.g. for statement parameters.
pub fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
    }
}

/// Converts an owned rusqlite value into a row value.
pub fn from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(i),
        SqlValue::Real(f) => Value::Real(f),
        SqlValue::Text(s) => Value::Text(s),
        SqlValue::Blob(b) => Value::Blob(b),
    }
}

/// Converts a borrowed column value into a row value.
///
/// # Errors
///
/// Returns [`BridgeError::Execution`] when text is not valid UTF-8.
pub fn from_value_ref(value: ValueRef<'_>) -> Result<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::Integer(i)),
        ValueRef::Real(f) => Ok(Value::Real(f)),
        ValueRef::Text(t) => std::str::from_utf8(t)
            .map(|s| Value::Text(s.to_string()))
            .map_err(|e| BridgeError::execution(format!("column is not valid UTF-8: {e}"))),
        ValueRef::Blob(b) => Ok(Value::Blob(b.to_vec())),
    }
}
