//! Cursor Lifecycle: open, filter, next, eof, column, rowid and close.
//!
//! The bridge tracks each cursor's position itself, so a provider cursor is
//! only asked for columns or row identities while it sits on a row:
//!
//! ```text
//! Opened --filter--> Iterating --next--> ... --> AtEnd
//!    \                    \                        |
//!     \--filter error--> Failed <--any error--     |
//!                          ^-------- filter (restart) from any state
//! ```
//!
//! `close` is accepted from every state.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::slice;

use rusqlite::ffi;
use tablebridge_core::{BridgeError, ChosenPlan, Cursor, PlanId, Provider, Result, Value};
use tracing::{debug, trace};

use crate::handle::{self, BoxKind, invariant_violation};
use crate::{connect, translate, value};

/// Where a cursor is in its scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CursorState {
    /// Opened, not yet filtered.
    Opened,
    /// Positioned on a row.
    Iterating,
    /// Past the last row.
    AtEnd,
    /// The last operation failed; only `filter` or `close` may follow.
    Failed,
}

/// Cursor record handed to the engine; `base` must stay first.
#[repr(C)]
struct CursorHeader {
    base: ffi::sqlite3_vtab_cursor,
    cursor: *mut c_void,
    state: CursorState,
}

impl CursorHeader {
    fn settle(&mut self, at_end: bool) {
        self.state = if at_end {
            CursorState::AtEnd
        } else {
            CursorState::Iterating
        };
    }

    fn require_row(&self, operation: &str) {
        if self.state != CursorState::Iterating {
            invariant_violation(format_args!(
                "{operation} called on a cursor in state {:?}",
                self.state
            ));
        }
    }
}

/// # Safety
///
/// `cursor` must come from [`x_open`] and not yet be closed.
unsafe fn header<'a>(cursor: *mut ffi::sqlite3_vtab_cursor) -> &'a mut CursorHeader {
    unsafe { &mut *cursor.cast::<CursorHeader>() }
}

/// # Safety
///
/// As for [`header`], with `P` the provider the cursor was opened on.
unsafe fn provider_cursor<'a, P: Provider>(header: &CursorHeader) -> &'a mut P::Cursor {
    unsafe { handle::borrow_mut(header.cursor, BoxKind::Cursor) }
}

pub(crate) unsafe extern "C" fn x_open<P: Provider>(
    vtab: *mut ffi::sqlite3_vtab,
    pp_cursor: *mut *mut ffi::sqlite3_vtab_cursor,
) -> c_int {
    let provider: &P = unsafe { connect::provider(vtab) };
    match translate::guard(|| provider.open()) {
        Ok(cursor) => {
            let table = unsafe { connect::header(vtab) };
            let boxed = handle::into_raw(cursor, BoxKind::Cursor, &table.ledger);
            let header = Box::new(CursorHeader {
                // SAFETY: the engine fills in pVtab after this returns.
                base: unsafe { std::mem::zeroed() },
                cursor: boxed,
                state: CursorState::Opened,
            });
            unsafe { *pp_cursor = Box::into_raw(header).cast::<ffi::sqlite3_vtab_cursor>() };
            trace!("cursor opened");
            ffi::SQLITE_OK
        }
        Err(err) => unsafe { translate::report_table(vtab, &err) },
    }
}

pub(crate) unsafe extern "C" fn x_close<P: Provider>(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    if cursor.is_null() {
        return ffi::SQLITE_OK;
    }
    let header = unsafe { Box::from_raw(cursor.cast::<CursorHeader>()) };
    let state = header.state;
    let inner: P::Cursor = unsafe { handle::consume(header.cursor, BoxKind::Cursor) };
    if let Err(err) = translate::guard(move || {
        drop(inner);
        Ok(())
    }) {
        debug!(error = %err, "cursor drop failed");
    }
    trace!(state = ?state, "cursor closed");
    ffi::SQLITE_OK
}

pub(crate) unsafe extern "C" fn x_filter<P: Provider>(
    cursor: *mut ffi::sqlite3_vtab_cursor,
    idx_num: c_int,
    idx_str: *const c_char,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) -> c_int {
    let header = unsafe { header(cursor) };
    let inner = unsafe { provider_cursor::<P>(header) };

    let result = (|| {
        let label = if idx_str.is_null() {
            None
        } else {
            Some(
                unsafe { CStr::from_ptr(idx_str) }
                    .to_str()
                    .map_err(|e| BridgeError::execution(format!("plan label is not UTF-8: {e}")))?,
            )
        };
        let args = unsafe { filter_arguments(argc, argv) }?;
        let plan = ChosenPlan::new(PlanId(idx_num), label);
        trace!(plan = idx_num, label, args = args.len(), "cursor filter");
        translate::guard(|| {
            inner.filter(&args, &plan)?;
            Ok(inner.at_end())
        })
    })();

    match result {
        Ok(at_end) => {
            header.settle(at_end);
            ffi::SQLITE_OK
        }
        Err(err) => {
            header.state = CursorState::Failed;
            unsafe { translate::report_cursor(cursor, &err) }
        }
    }
}

/// # Safety
///
/// `argv` must hold `argc` valid values.
unsafe fn filter_arguments(argc: c_int, argv: *mut *mut ffi::sqlite3_value) -> Result<Vec<Value>> {
    if argc <= 0 || argv.is_null() {
        return Ok(Vec::new());
    }
    let raw = unsafe { slice::from_raw_parts(argv, argc as usize) };
    raw.iter().map(|&v| unsafe { value::from_raw(v) }).collect()
}

pub(crate) unsafe extern "C" fn x_next<P: Provider>(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    let header = unsafe { header(cursor) };
    header.require_row("next");
    let inner = unsafe { provider_cursor::<P>(header) };
    match translate::guard(|| {
        inner.advance()?;
        Ok(inner.at_end())
    }) {
        Ok(at_end) => {
            header.settle(at_end);
            ffi::SQLITE_OK
        }
        Err(err) => {
            header.state = CursorState::Failed;
            unsafe { translate::report_cursor(cursor, &err) }
        }
    }
}

pub(crate) unsafe extern "C" fn x_eof<P: Provider>(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    let header = unsafe { header(cursor) };
    c_int::from(header.state != CursorState::Iterating)
}

pub(crate) unsafe extern "C" fn x_column<P: Provider>(
    cursor: *mut ffi::sqlite3_vtab_cursor,
    ctx: *mut ffi::sqlite3_context,
    index: c_int,
) -> c_int {
    let header = unsafe { header(cursor) };
    header.require_row("column");
    let inner = unsafe { provider_cursor::<P>(header) };
    let result = match usize::try_from(index) {
        Ok(index) => translate::guard(|| inner.column(index)),
        Err(_) => Err(BridgeError::execution(format!("invalid column index {index}"))),
    };
    match result {
        Ok(value) => {
            unsafe { value::set_result(ctx, &value) };
            ffi::SQLITE_OK
        }
        Err(err) => {
            header.state = CursorState::Failed;
            unsafe { translate::report_context(ctx, &err) }
        }
    }
}

pub(crate) unsafe extern "C" fn x_rowid<P: Provider>(
    cursor: *mut ffi::sqlite3_vtab_cursor,
    p_rowid: *mut ffi::sqlite3_int64,
) -> c_int {
    let header = unsafe { header(cursor) };
    header.require_row("rowid");
    let inner = unsafe { provider_cursor::<P>(header) };
    match translate::guard(|| inner.row_identity()) {
        Ok(rowid) => {
            unsafe { *p_rowid = rowid };
            ffi::SQLITE_OK
        }
        Err(err) => {
            header.state = CursorState::Failed;
            unsafe { translate::report_cursor(cursor, &err) }
        }
    }
}
