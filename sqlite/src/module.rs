//! Per-provider callback tables.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::sync::Arc;

use rusqlite::ffi;
use tablebridge_core::{Arguments, Provider, Result};
use tracing::trace;

use crate::handle::{self, BoxKind, BoxLedger};
use crate::{connect, cursor, index};

/// Whether a module can back `CREATE VIRTUAL TABLE` statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// Tables exist implicitly, one per module name, and cannot be created
    /// or dropped.
    EponymousOnly,
    /// Tables are created with `CREATE VIRTUAL TABLE ... USING name(...)`
    /// and removed with `DROP TABLE`.
    Creatable,
}

impl TableKind {
    pub fn from_eponymous_only(eponymous_only: bool) -> Self {
        if eponymous_only {
            TableKind::EponymousOnly
        } else {
            TableKind::Creatable
        }
    }
}

/// Everything one registered module needs; lives in a registration box
/// whose handle is the module's client data.
pub(crate) struct Registration<P: Provider> {
    pub(crate) name: String,
    pub(crate) ledger: Arc<BoxLedger>,
    pub(crate) constructor: fn(&Arguments) -> Result<P>,
    module: ffi::sqlite3_module,
    _provider: PhantomData<fn() -> P>,
}

impl<P: Provider> Registration<P> {
    pub(crate) fn new(name: &str, kind: TableKind, ledger: Arc<BoxLedger>) -> Self {
        Self {
            name: name.to_string(),
            ledger,
            constructor: P::construct,
            module: callbacks::<P>(kind),
            _provider: PhantomData,
        }
    }

    /// The callback table. Its address stays fixed for as long as the box
    /// holding this registration is alive.
    pub(crate) fn module(&self) -> *const ffi::sqlite3_module {
        &self.module
    }
}

/// Builds the callback table for `P`.
///
/// Eponymous-only modules leave `xCreate` and `xDestroy` empty; creatable
/// modules get distinct create and connect entry points.
pub(crate) fn callbacks<P: Provider>(kind: TableKind) -> ffi::sqlite3_module {
    // SAFETY: sqlite3_module is plain C data; all-null callbacks are valid.
    let mut module: ffi::sqlite3_module = unsafe { std::mem::zeroed() };
    module.iVersion = 1;
    if kind == TableKind::Creatable {
        module.xCreate = Some(connect::x_create::<P>);
        module.xDestroy = Some(connect::x_destroy::<P>);
    }
    module.xConnect = Some(connect::x_connect::<P>);
    module.xDisconnect = Some(connect::x_disconnect::<P>);
    module.xBestIndex = Some(index::x_best_index::<P>);
    module.xOpen = Some(cursor::x_open::<P>);
    module.xClose = Some(cursor::x_close::<P>);
    module.xFilter = Some(cursor::x_filter::<P>);
    module.xNext = Some(cursor::x_next::<P>);
    module.xEof = Some(cursor::x_eof::<P>);
    module.xColumn = Some(cursor::x_column::<P>);
    module.xRowid = Some(cursor::x_rowid::<P>);
    module
}

/// Client-data destructor; the engine calls it once when the module is
/// dropped or the connection closes, and also when registration fails.
pub(crate) unsafe extern "C" fn release_registration<P: Provider>(aux: *mut c_void) {
    let registration: Registration<P> = unsafe { handle::consume(aux, BoxKind::Registration) };
    trace!(module = %registration.name, "registration released");
}
