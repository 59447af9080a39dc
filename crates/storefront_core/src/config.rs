//! Core configuration.
//!
//! # Responsibility
//! - Hold the tunables of the closing workflow.
//! - Load them from TOML with per-field defaults.
//!
//! # Invariants
//! - A loaded config always passes `validate()`.

use crate::store::{DEFAULT_MAX_BATCH_OPS, MIN_BATCH_OPS};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Default number of reverts allowed across all years.
pub const DEFAULT_REVERT_CEILING: u32 = 2;
/// Earliest fiscal year that may be closed.
pub const DEFAULT_MIN_YEAR: i32 = 2020;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

/// Tunables for the annual closing workflow.
///
/// ```toml
/// [closing]
/// revert_ceiling = 2
/// min_year = 2020
/// max_batch_ops = 500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Total reverts allowed, for any year, over the store's lifetime.
    pub revert_ceiling: u32,
    /// Lowest year accepted by the closing entry points.
    pub min_year: i32,
    /// Per-batch operation limit applied to the document store.
    pub max_batch_ops: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            revert_ceiling: DEFAULT_REVERT_CEILING,
            min_year: DEFAULT_MIN_YEAR,
            max_batch_ops: DEFAULT_MAX_BATCH_OPS,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    closing: CoreConfig,
}

impl CoreConfig {
    /// Parses a TOML document; the `[closing]` table is optional.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(source)?;
        file.closing.validate()?;
        Ok(file.closing)
    }

    /// Reads and parses a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.revert_ceiling == 0 {
            return Err(ConfigError::Invalid(
                "revert_ceiling must be at least 1".to_string(),
            ));
        }
        if !(1970..=9999).contains(&self.min_year) {
            return Err(ConfigError::Invalid(format!(
                "min_year must be within 1970..=9999, got {}",
                self.min_year
            )));
        }
        if self.max_batch_ops < MIN_BATCH_OPS {
            return Err(ConfigError::Invalid(format!(
                "max_batch_ops must be at least {MIN_BATCH_OPS}, got {}",
                self.max_batch_ops
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig};

    #[test]
    fn empty_document_yields_defaults() {
        let config = CoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.revert_ceiling, 2);
        assert_eq!(config.min_year, 2020);
    }

    #[test]
    fn partial_table_keeps_other_defaults() {
        let config = CoreConfig::from_toml_str("[closing]\nrevert_ceiling = 5\n").unwrap();
        assert_eq!(config.revert_ceiling, 5);
        assert_eq!(config.max_batch_ops, 500);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = CoreConfig::from_toml_str("[closing]\nrevert_ceiling = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = CoreConfig::from_toml_str("[closing]\nmax_batch_ops = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = CoreConfig::from_toml_str("[closing]\nceiling = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
