//! Settings loaded from a TOML file.
//!
//! ```toml
//! [parser]
//! date_order = "day_first"
//!
//! [storage]
//! database = "hackspace.db"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// How to read an all-numeric date such as `02/03/2024` when neither
/// group is greater than 12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
    #[default]
    DayFirst,
    MonthFirst,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub date_order: DateOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("hackspace.db"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub parser: ParserConfig,
    pub storage: StorageConfig,
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.parser.date_order, DateOrder::DayFirst);
        assert_eq!(config.storage.database, PathBuf::from("hackspace.db"));
    }

    #[test]
    fn month_first_override() {
        let config = Config::from_toml("[parser]\ndate_order = \"month_first\"\n").unwrap();
        assert_eq!(config.parser.date_order, DateOrder::MonthFirst);
    }

    #[test]
    fn unknown_date_order_is_an_error() {
        assert!(Config::from_toml("[parser]\ndate_order = \"year_first\"\n").is_err());
    }

    #[test]
    fn load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hackspace.toml");
        std::fs::write(&path, "[storage]\ndatabase = \"/var/lib/hackspace/ledger.db\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.storage.database, PathBuf::from("/var/lib/hackspace/ledger.db"));
        assert_eq!(config.parser.date_order, DateOrder::DayFirst);
    }
}
