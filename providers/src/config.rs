//! Provider registration config.
//!
//! Describes which built-in providers to install on a connection and under
//! which module names.
//!
//! # Example YAML
//!
//! ```yaml
//! version: "1.0"
//! providers:
//!   - name: generate_series
//!     kind: series
//!     eponymous_only: true
//!   - name: records
//!     kind: records
//!   - name: json_rows
//!     kind: records
//! ```

use std::fmt;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tablebridge_sqlite::ProviderConnection;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::records::Records;
use crate::series::Series;

/// Built-in provider implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// [`Series`]: `generate_series(start, stop, step)`.
    Series,
    /// [`Records`]: tables over JSON records.
    Records,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Series => "series",
            ProviderKind::Records => "records",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "series" => Ok(ProviderKind::Series),
            "records" => Ok(ProviderKind::Records),
            _ => Err(ConfigError::UnknownKind(s.to_string())),
        }
    }
}

/// One module to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Module name used in SQL.
    pub name: String,
    /// Which provider backs the module.
    pub kind: ProviderKind,
    /// Register as an eponymous-only table (table-valued function style).
    #[serde(default)]
    pub eponymous_only: bool,
}

impl ProviderEntry {
    pub fn new(name: impl Into<String>, kind: ProviderKind, eponymous_only: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            eponymous_only,
        }
    }
}

impl FromStr for ProviderEntry {
    type Err = ConfigError;

    /// Parses `name=kind`. Series entries are eponymous-only, records
    /// entries creatable.
    ///
    /// # Examples
    ///
    /// ```
    /// # use tablebridge_providers::{ProviderEntry, ProviderKind};
    /// let entry: ProviderEntry = "seq=series".parse().unwrap();
    /// assert_eq!(entry.kind, ProviderKind::Series);
    /// assert!(entry.eponymous_only);
    /// ```
    fn from_str(s: &str) -> Result<Self> {
        let (name, kind) = s
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidEntry(s.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidEntry(s.to_string()));
        }
        let kind: ProviderKind = kind.parse()?;
        Ok(Self::new(name, kind, kind == ProviderKind::Series))
    }
}

/// Top-level provider configuration.
///
/// # Examples
///
/// ```no_run
/// use tablebridge_providers::ProvidersConfig;
/// use tablebridge_sqlite::ProviderConnection;
///
/// let config = ProvidersConfig::load("providers.yml").unwrap();
/// let mut conn = ProviderConnection::open_in_memory().unwrap();
/// config.apply(&mut conn).unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Configuration format version (e.g., `"1.0"`).
    pub version: String,
    /// Modules to register, in order.
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            providers: vec![
                ProviderEntry::new("generate_series", ProviderKind::Series, true),
                ProviderEntry::new("records", ProviderKind::Records, false),
            ],
        }
    }
}

impl ProvidersConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](ConfigError::IoError) if the file cannot be read,
    /// or [`YamlError`](ConfigError::YamlError) if parsing fails (including
    /// an unknown `kind`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](ConfigError::IoError) if the file cannot be
    /// written, or [`YamlError`](ConfigError::YamlError) if serialization
    /// fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Looks up an entry by module name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&ProviderEntry> {
        self.providers
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Registers every entry on `conn`, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError`](ConfigError::RegistrationError) for an
    /// invalid or duplicate name, or when the engine rejects the module.
    pub fn apply(&self, conn: &mut ProviderConnection) -> Result<()> {
        for entry in &self.providers {
            match entry.kind {
                ProviderKind::Series => conn.register::<Series>(&entry.name, entry.eponymous_only)?,
                ProviderKind::Records => {
                    conn.register::<Records>(&entry.name, entry.eponymous_only)?
                }
            }
            debug!(module = %entry.name, kind = %entry.kind, "provider applied");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProvidersConfig::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.providers.len(), 2);
        assert!(config.get("GENERATE_SERIES").unwrap().eponymous_only);
        assert_eq!(config.get("records").unwrap().kind, ProviderKind::Records);
        assert!(config.get("missing").is_none());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("Series".parse::<ProviderKind>().unwrap(), ProviderKind::Series);
        assert_eq!(" records ".parse::<ProviderKind>().unwrap(), ProviderKind::Records);
        assert!(matches!(
            "csv".parse::<ProviderKind>(),
            Err(ConfigError::UnknownKind(k)) if k == "csv"
        ));
    }

    #[test]
    fn test_entry_from_str() {
        let entry: ProviderEntry = "people=records".parse().unwrap();
        assert_eq!(entry, ProviderEntry::new("people", ProviderKind::Records, false));
        assert!(matches!(
            "people".parse::<ProviderEntry>(),
            Err(ConfigError::InvalidEntry(_))
        ));
        assert!(matches!(
            "=series".parse::<ProviderEntry>(),
            Err(ConfigError::InvalidEntry(_))
        ));
        assert!(matches!(
            "x=csv".parse::<ProviderEntry>(),
            Err(ConfigError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
version: "1.0"
providers:
  - name: seq
    kind: series
    eponymous_only: true
  - name: rows
    kind: records
"#;
        let config: ProvidersConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.providers[0], ProviderEntry::new("seq", ProviderKind::Series, true));
        assert!(!config.providers[1].eponymous_only);
    }

    #[test]
    fn test_unknown_kind_in_yaml() {
        let yaml = "version: \"1.0\"\nproviders:\n  - name: x\n    kind: csv\n";
        assert!(serde_yaml::from_str::<ProvidersConfig>(yaml).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers.yml");
        let mut config = ProvidersConfig::default();
        config
            .providers
            .push(ProviderEntry::new("seq", ProviderKind::Series, false));
        config.save(&path).unwrap();
        assert_eq!(ProvidersConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ProvidersConfig::load("/nonexistent/providers.yml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
