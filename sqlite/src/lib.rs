//! SQLite bridge for table providers.
//!
//! This crate installs any [`tablebridge_core::Provider`] as a SQLite
//! virtual table module. It owns every unsafe operation in the workspace:
//! the engine calls back through a table of `extern "C"` functions, and
//! this crate recovers the Rust objects behind those calls, runs them, and
//! turns their results back into engine conventions.
//!
//! # Architecture
//!
//! - **`handle`**: Ownership Box. Opaque, tagged handles with a ledger
//!   counting every create and consume.
//! - **`translate`**: Error Translator between [`BridgeError`] and status
//!   codes plus engine-allocated messages.
//! - **`module`** / **`registry`**: Provider Registration and the
//!   per-connection [`Registry`].
//! - **`connect`**: Connection Handshake (create, connect, disconnect,
//!   destroy).
//! - **`index`**: Query Planner Negotiation glue.
//! - **`cursor`**: Cursor Lifecycle.
//! - **`value`**: row value marshaling.
//!
//! # Quick start
//!
//! ```no_run
//! use tablebridge_sqlite::ProviderConnection;
//! # use tablebridge_core::*;
//! # struct Logs;
//! # struct LogCursor;
//! # impl Provider for Logs {
//! #     type Cursor = LogCursor;
//! #     fn construct(_: &Arguments) -> Result<Self> { Ok(Logs) }
//! #     fn schema(&self) -> String { "CREATE TABLE x(line TEXT)".into() }
//! #     fn open(&self) -> Result<LogCursor> { Ok(LogCursor) }
//! # }
//! # impl Cursor for LogCursor {
//! #     fn filter(&mut self, _: &[Value], _: &ChosenPlan<'_>) -> Result<()> { Ok(()) }
//! #     fn advance(&mut self) -> Result<()> { Ok(()) }
//! #     fn at_end(&self) -> bool { true }
//! #     fn column(&self, _: usize) -> Result<Value> { Ok(Value::Null) }
//! #     fn row_identity(&self) -> Result<i64> { Ok(0) }
//! # }
//!
//! let mut conn = ProviderConnection::open_in_memory().unwrap();
//! conn.register::<Logs>("logs", false).unwrap();
//! conn.execute_batch("CREATE VIRTUAL TABLE app_logs USING logs(path='/var/log/app.log')")
//!     .unwrap();
//! let ledger = conn.ledger();
//! conn.close().unwrap();
//! assert!(ledger.stats().balanced());
//! ```
//!
//! [`BridgeError`]: tablebridge_core::BridgeError

mod connect;
mod cursor;
mod error;
mod handle;
mod index;
mod module;
mod registry;
mod translate;
mod value;

pub use error::{Error, Result};
pub use handle::{BoxCount, BoxKind, BoxLedger, BoxStats};
pub use module::TableKind;
pub use registry::{ProviderConnection, RegisteredProvider, Registry};
pub use translate::{classify, engine_error, status_code};
pub use value::{from_sql, from_value_ref, to_sql};
