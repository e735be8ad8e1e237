//! Provider Registration and the per-connection registry.
//!
//! Registered module names live in a [`Registry`] owned by the
//! [`ProviderConnection`], so everything installed on a connection goes away
//! with it. There is no process-wide state.

use std::any::type_name;
use std::ffi::CString;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, ffi};
use tablebridge_core::Provider;
use tracing::debug;

use crate::error::{Error, Result};
use crate::handle::{self, BoxKind, BoxLedger, BoxStats};
use crate::module::{Registration, TableKind, release_registration};
use crate::translate;

/// One module installed on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredProvider {
    pub name: String,
    pub kind: TableKind,
    /// Rust type name of the provider, for diagnostics.
    pub type_name: &'static str,
}

/// Modules installed on one connection, in registration order.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<RegisteredProvider>,
}

impl Registry {
    pub fn entries(&self) -> &[RegisteredProvider] {
        &self.entries
    }

    /// Looks up a module by name; the engine treats names case-insensitively.
    pub fn get(&self, name: &str) -> Option<&RegisteredProvider> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Checks that `name` is non-empty and only ASCII alphanumerics or `_`.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

/// A SQLite connection with a provider registry attached.
///
/// Dereferences to [`rusqlite::Connection`] for running statements.
///
/// # Examples
///
/// ```no_run
/// use tablebridge_sqlite::ProviderConnection;
/// # use tablebridge_core::*;
/// # struct Numbers;
/// # struct NumberCursor;
/// # impl Provider for Numbers {
/// #     type Cursor = NumberCursor;
/// #     fn construct(_: &Arguments) -> Result<Self> { Ok(Numbers) }
/// #     fn schema(&self) -> String { "CREATE TABLE x(n)".into() }
/// #     fn open(&self) -> Result<NumberCursor> { Ok(NumberCursor) }
/// # }
/// # impl Cursor for NumberCursor {
/// #     fn filter(&mut self, _: &[Value], _: &ChosenPlan<'_>) -> Result<()> { Ok(()) }
/// #     fn advance(&mut self) -> Result<()> { Ok(()) }
/// #     fn at_end(&self) -> bool { true }
/// #     fn column(&self, _: usize) -> Result<Value> { Ok(Value::Null) }
/// #     fn row_identity(&self) -> Result<i64> { Ok(0) }
/// # }
///
/// let mut conn = ProviderConnection::open("app.db").unwrap();
/// conn.register::<Numbers>("numbers", true).unwrap();
/// let count: i64 = conn
///     .query_row("SELECT count(*) FROM numbers", [], |row| row.get(0))
///     .unwrap();
/// ```
pub struct ProviderConnection {
    // Dropped first: closing the connection releases every box it holds.
    conn: Connection,
    registry: Registry,
    ledger: Arc<BoxLedger>,
}

impl ProviderConnection {
    /// Wraps an existing connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            registry: Registry::default(),
            ledger: Arc::new(BoxLedger::new()),
        }
    }

    /// Opens (or creates) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Connection::open(path)?))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    /// Installs provider type `P` under `name`.
    ///
    /// With `eponymous_only` the table exists implicitly as `name` (typical
    /// for table-valued functions); otherwise tables are created with
    /// `CREATE VIRTUAL TABLE t USING name(...)`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidName`] if `name` is not a plain identifier
    /// - [`Error::DuplicateName`] if `name` is already registered here
    /// - [`Error::Registration`] if the engine rejects the module
    pub fn register<P: Provider>(&mut self, name: &str, eponymous_only: bool) -> Result<()> {
        validate_name(name)?;
        if self.registry.contains(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        let c_name = CString::new(name).map_err(|_| Error::InvalidName(name.to_string()))?;
        let kind = TableKind::from_eponymous_only(eponymous_only);

        let registration = Registration::<P>::new(name, kind, Arc::clone(&self.ledger));
        let aux = handle::into_raw(registration, BoxKind::Registration, &self.ledger);
        // SAFETY: `aux` was just created and is alive until the engine calls
        // `release_registration`, which also keeps the callback table alive.
        let module = unsafe { handle::borrow::<Registration<P>>(aux, BoxKind::Registration) }.module();

        let rc = unsafe {
            let db = self.conn.handle();
            ffi::sqlite3_create_module_v2(
                db,
                c_name.as_ptr(),
                module,
                aux,
                Some(release_registration::<P>),
            )
        };
        if rc != ffi::SQLITE_OK {
            // The engine has already run the destructor on `aux`.
            let message = unsafe { translate::last_message(self.conn.handle()) }
                .unwrap_or_else(|| translate::engine_error(rc, None).to_string());
            return Err(Error::Registration {
                name: name.to_string(),
                message,
            });
        }

        self.registry.entries.push(RegisteredProvider {
            name: name.to_string(),
            kind,
            type_name: type_name::<P>(),
        });
        debug!(module = name, kind = ?kind, provider = type_name::<P>(), "module registered");
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Shared box counters. Keep a clone to inspect them after [`close`].
    ///
    /// [`close`]: ProviderConnection::close
    pub fn ledger(&self) -> Arc<BoxLedger> {
        Arc::clone(&self.ledger)
    }

    pub fn box_stats(&self) -> BoxStats {
        self.ledger.stats()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Closes the connection, disconnecting every table and releasing every
    /// registration.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, err)| Error::Database(err))
    }
}

impl Deref for ProviderConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("generate_series").is_ok());
        assert!(validate_name("t2").is_ok());
        assert!(matches!(validate_name(""), Err(Error::InvalidName(_))));
        assert!(matches!(validate_name("a-b"), Err(Error::InvalidName(_))));
        assert!(matches!(validate_name("a b"), Err(Error::InvalidName(_))));
        assert!(matches!(validate_name("é"), Err(Error::InvalidName(_))));
    }

    #[test]
    fn test_registry_lookup_ignores_case() {
        let registry = Registry {
            entries: vec![RegisteredProvider {
                name: "Records".into(),
                kind: TableKind::Creatable,
                type_name: "x",
            }],
        };
        assert!(registry.contains("records"));
        assert!(registry.get("RECORDS").is_some());
        assert!(!registry.contains("record"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_new_connection_has_no_boxes() {
        let conn = ProviderConnection::open_in_memory().unwrap();
        assert!(conn.registry().is_empty());
        assert_eq!(conn.box_stats(), BoxStats::default());
        conn.close().unwrap();
    }
}
