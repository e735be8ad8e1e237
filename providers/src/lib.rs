//! Built-in table providers and their registration config.
//!
//! - [`Series`]: the `generate_series(start, stop, step)` table-valued
//!   function.
//! - [`Records`]: read-only tables over JSON records, inline or from a file.
//! - [`ProvidersConfig`]: a YAML list of modules to install on a
//!   [`ProviderConnection`](tablebridge_sqlite::ProviderConnection).
//!
//! ```no_run
//! use tablebridge_providers::ProvidersConfig;
//! use tablebridge_sqlite::ProviderConnection;
//!
//! let mut conn = ProviderConnection::open_in_memory().unwrap();
//! ProvidersConfig::default().apply(&mut conn).unwrap();
//! let total: i64 = conn
//!     .query_row("SELECT sum(value) FROM generate_series(1, 100)", [], |row| row.get(0))
//!     .unwrap();
//! assert_eq!(total, 5050);
//! ```

mod config;
mod error;
mod records;
mod series;

pub use config::{ProviderEntry, ProviderKind, ProvidersConfig};
pub use error::{ConfigError, Result};
pub use records::{Records, RecordsCursor};
pub use series::{DEFAULT_STOP, Series, SeriesCursor};
