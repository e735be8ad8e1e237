//! Connection Handshake: create/connect and disconnect/destroy.
//!
//! A successful handshake produces exactly one provider box, owned by the
//! [`TableHeader`] handed to the engine. Disconnect (and a successful
//! destroy) consumes that box; nothing else does.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::slice;
use std::sync::Arc;

use rusqlite::ffi;
use tablebridge_core::{Arguments, BridgeError, ConnectMode, Provider, ProviderOptions, Result};
use tracing::{debug, trace};

use crate::handle::{self, BoxKind, BoxLedger};
use crate::module::Registration;
use crate::translate;

/// Table record handed to the engine. `base` must stay first so the
/// engine's `sqlite3_vtab` pointer is also a pointer to the header.
#[repr(C)]
pub(crate) struct TableHeader {
    base: ffi::sqlite3_vtab,
    provider: *mut c_void,
    pub(crate) ledger: Arc<BoxLedger>,
}

/// # Safety
///
/// `vtab` must come from a successful handshake for `P` and not yet be
/// disconnected.
pub(crate) unsafe fn header<'a>(vtab: *mut ffi::sqlite3_vtab) -> &'a TableHeader {
    unsafe { &*vtab.cast::<TableHeader>() }
}

/// Borrows the provider behind a table handle.
///
/// # Safety
///
/// See [`header`].
pub(crate) unsafe fn provider<'a, P: Provider>(vtab: *mut ffi::sqlite3_vtab) -> &'a P {
    unsafe { handle::borrow(header(vtab).provider, BoxKind::Provider) }
}

pub(crate) unsafe extern "C" fn x_create<P: Provider>(
    db: *mut ffi::sqlite3,
    aux: *mut c_void,
    argc: c_int,
    argv: *const *const c_char,
    pp_vtab: *mut *mut ffi::sqlite3_vtab,
    pz_err: *mut *mut c_char,
) -> c_int {
    unsafe { establish::<P>(ConnectMode::Create, db, aux, argc, argv, pp_vtab, pz_err) }
}

pub(crate) unsafe extern "C" fn x_connect<P: Provider>(
    db: *mut ffi::sqlite3,
    aux: *mut c_void,
    argc: c_int,
    argv: *const *const c_char,
    pp_vtab: *mut *mut ffi::sqlite3_vtab,
    pz_err: *mut *mut c_char,
) -> c_int {
    unsafe { establish::<P>(ConnectMode::Connect, db, aux, argc, argv, pp_vtab, pz_err) }
}

unsafe fn establish<P: Provider>(
    mode: ConnectMode,
    db: *mut ffi::sqlite3,
    aux: *mut c_void,
    argc: c_int,
    argv: *const *const c_char,
    pp_vtab: *mut *mut ffi::sqlite3_vtab,
    pz_err: *mut *mut c_char,
) -> c_int {
    let registration: &Registration<P> = unsafe { handle::borrow(aux, BoxKind::Registration) };

    let result = translate::guard(|| {
        let raw = unsafe { raw_arguments(argc, argv) }?;
        let args = Arguments::from_raw(mode, raw)?;
        let provider = (registration.constructor)(&args)?;
        unsafe { declare(db, &provider.schema()) }?;
        unsafe { apply_options(db, provider.options()) }?;
        Ok((args, provider))
    });

    match result {
        Ok((args, provider)) => {
            let boxed = handle::into_raw(provider, BoxKind::Provider, &registration.ledger);
            let header = Box::new(TableHeader {
                // SAFETY: an all-zero sqlite3_vtab is the documented initial state.
                base: unsafe { std::mem::zeroed() },
                provider: boxed,
                ledger: Arc::clone(&registration.ledger),
            });
            unsafe { *pp_vtab = Box::into_raw(header).cast::<ffi::sqlite3_vtab>() };
            debug!(
                module = %registration.name,
                table = args.table(),
                mode = ?mode,
                "table attached"
            );
            ffi::SQLITE_OK
        }
        Err(err) => {
            debug!(module = %registration.name, mode = ?mode, error = %err, "handshake failed");
            unsafe { translate::report_out(pz_err, &err) }
        }
    }
}

/// # Safety
///
/// `argv` must hold `argc` NUL-terminated strings.
unsafe fn raw_arguments(argc: c_int, argv: *const *const c_char) -> Result<Vec<String>> {
    if argc <= 0 || argv.is_null() {
        return Ok(Vec::new());
    }
    let args = unsafe { slice::from_raw_parts(argv, argc as usize) };
    args.iter()
        .map(|&arg| {
            unsafe { CStr::from_ptr(arg) }
                .to_str()
                .map(str::to_string)
                .map_err(|e| BridgeError::construction(format!("argument is not valid UTF-8: {e}")))
        })
        .collect()
}

/// # Safety
///
/// `db` must be the connection of the running handshake.
unsafe fn declare(db: *mut ffi::sqlite3, schema: &str) -> Result<()> {
    let sql = CString::new(schema)
        .map_err(|_| BridgeError::construction("schema contains a NUL byte"))?;
    let rc = unsafe { ffi::sqlite3_declare_vtab(db, sql.as_ptr()) };
    if rc != ffi::SQLITE_OK {
        return Err(translate::engine_error(rc, unsafe { translate::last_message(db) }));
    }
    Ok(())
}

/// # Safety
///
/// `db` must be the connection of the running handshake, after the schema
/// has been declared.
unsafe fn apply_options(db: *mut ffi::sqlite3, options: ProviderOptions) -> Result<()> {
    let mut results = Vec::new();
    unsafe {
        if options.constraint_support {
            results.push(ffi::sqlite3_vtab_config(
                db,
                ffi::SQLITE_VTAB_CONSTRAINT_SUPPORT,
                1 as c_int,
            ));
        }
        if options.innocuous {
            results.push(ffi::sqlite3_vtab_config(db, ffi::SQLITE_VTAB_INNOCUOUS));
        }
        if options.direct_only {
            results.push(ffi::sqlite3_vtab_config(db, ffi::SQLITE_VTAB_DIRECTONLY));
        }
    }
    match results.into_iter().find(|&rc| rc != ffi::SQLITE_OK) {
        Some(rc) => Err(translate::engine_error(rc, unsafe { translate::last_message(db) })),
        None => Ok(()),
    }
}

pub(crate) unsafe extern "C" fn x_disconnect<P: Provider>(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    if vtab.is_null() {
        return ffi::SQLITE_OK;
    }
    let header = unsafe { Box::from_raw(vtab.cast::<TableHeader>()) };
    if !header.base.zErrMsg.is_null() {
        unsafe { ffi::sqlite3_free(header.base.zErrMsg.cast::<c_void>()) };
    }
    let provider: P = unsafe { handle::consume(header.provider, BoxKind::Provider) };
    if let Err(err) = translate::guard(move || {
        drop(provider);
        Ok(())
    }) {
        debug!(error = %err, "provider drop failed");
    }
    trace!("table detached");
    ffi::SQLITE_OK
}

pub(crate) unsafe extern "C" fn x_destroy<P: Provider>(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    if vtab.is_null() {
        return ffi::SQLITE_OK;
    }
    let provider: &mut P = unsafe { handle::borrow_mut(header(vtab).provider, BoxKind::Provider) };
    match translate::guard(|| provider.destroy()) {
        Ok(()) => {
            debug!("table destroyed");
            unsafe { x_disconnect::<P>(vtab) }
        }
        // The table stays in the schema and is disconnected later.
        Err(err) => unsafe { translate::report_table(vtab, &err) },
    }
}
