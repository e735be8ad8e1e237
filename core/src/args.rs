//! Provider constructor arguments.
//!
//! The engine hands a provider constructor a list of argument strings: the
//! module name, the database name, the table name, then whatever appeared in
//! the `USING module(...)` clause. [`Arguments`] keeps that list and offers
//! `key=value` lookups with quote stripping.
//!
//! # Example
//!
//! ```
//! use tablebridge_core::{Arguments, ConnectMode};
//!
//! let args = Arguments::from_raw(
//!     ConnectMode::Create,
//!     vec![
//!         "records".into(),
//!         "main".into(),
//!         "people".into(),
//!         "columns='name, age'".into(),
//!         "strict=yes".into(),
//!     ],
//! )
//! .unwrap();
//!
//! assert_eq!(args.table(), "people");
//! assert_eq!(args.require("columns").unwrap(), "name, age");
//! assert_eq!(args.get_bool("strict").unwrap(), Some(true));
//! assert!(args.require("data").is_err());
//! ```

use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Which protocol entry point constructed the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectMode {
    /// `CREATE VIRTUAL TABLE` is creating the table for the first time.
    Create,
    /// An existing table (or an eponymous table) is being attached.
    Connect,
}

/// Argument strings passed to a provider constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arguments {
    mode: ConnectMode,
    module: String,
    database: String,
    table: String,
    args: Vec<String>,
}

impl Arguments {
    /// Builds arguments from their parts.
    pub fn new(
        mode: ConnectMode,
        module: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            mode,
            module: module.into(),
            database: database.into(),
            table: table.into(),
            args,
        }
    }

    /// Builds arguments from the raw list supplied by the engine.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Construction`] if the list has fewer than the
    /// three leading entries (module, database, table).
    pub fn from_raw(mode: ConnectMode, raw: Vec<String>) -> Result<Self> {
        if raw.len() < 3 {
            return Err(BridgeError::construction(format!(
                "expected at least 3 arguments (module, database, table), got {}",
                raw.len()
            )));
        }
        let mut iter = raw.into_iter();
        let module = iter.next().unwrap_or_default();
        let database = iter.next().unwrap_or_default();
        let table = iter.next().unwrap_or_default();
        Ok(Self {
            mode,
            module,
            database,
            table,
            args: iter.collect(),
        })
    }

    pub fn mode(&self) -> ConnectMode {
        self.mode
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Arguments that followed the module name in the `USING` clause.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Parses every user argument as `key=value`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Construction`] for the first argument without
    /// an `=`.
    pub fn parameters(&self) -> Result<Vec<(&str, &str)>> {
        self.args.iter().map(|arg| parameter(arg)).collect()
    }

    /// Looks up the dequoted value of `key`.
    ///
    /// Keys are compared case-insensitively. Arguments that are not
    /// `key=value` pairs are skipped.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .filter_map(|arg| parameter(arg).ok())
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// Looks up a required `key`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Construction`] naming the missing key.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            BridgeError::construction(format!("missing required argument '{key}'"))
        })
    }

    /// Looks up `key` and parses it as a boolean.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => parse_boolean(raw).map(Some).ok_or_else(|| {
                BridgeError::construction(format!("argument '{key}' is not a boolean: {raw}"))
            }),
        }
    }

    /// Looks up `key` and parses it with [`FromStr`].
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                BridgeError::construction(format!("argument '{key}' has an invalid value: {raw}"))
            }),
        }
    }

    /// Rejects malformed arguments and keys outside `known`.
    pub fn check_known(&self, known: &[&str]) -> Result<()> {
        for (key, _) in self.parameters()? {
            if !known.iter().any(|k| k.eq_ignore_ascii_case(key)) {
                return Err(BridgeError::construction(format!(
                    "unknown argument '{key}' (expected one of: {})",
                    known.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Splits `key=value`, trimming both sides and dequoting the value.
///
/// # Errors
///
/// Returns [`BridgeError::Construction`] when `arg` has no `=`.
pub fn parameter(arg: &str) -> Result<(&str, &str)> {
    let arg = arg.trim();
    match arg.split_once('=') {
        Some((key, value)) => Ok((key.trim(), dequote(value.trim()))),
        None => Err(BridgeError::construction(format!(
            "illegal argument: '{arg}' (expected key=value)"
        ))),
    }
}

/// Strips one matching pair of single or double quotes.
pub fn dequote(s: &str) -> &str {
    if s.len() < 2 {
        return s;
    }
    match (s.chars().next(), s.chars().last()) {
        (Some('"'), Some('"')) | (Some('\''), Some('\'')) => &s[1..s.len() - 1],
        _ => s,
    }
}

/// Parses `1/yes/on/true` and `0/no/off/false`, case-insensitively.
pub fn parse_boolean(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("1")
        || s.eq_ignore_ascii_case("yes")
        || s.eq_ignore_ascii_case("on")
        || s.eq_ignore_ascii_case("true")
    {
        Some(true)
    } else if s.eq_ignore_ascii_case("0")
        || s.eq_ignore_ascii_case("no")
        || s.eq_ignore_ascii_case("off")
        || s.eq_ignore_ascii_case("false")
    {
        Some(false)
    } else {
        None
    }
}
