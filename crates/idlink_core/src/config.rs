//! Runtime configuration loaded from the environment.
//!
//! # Responsibility
//! - Resolve the contact store location and logging settings.
//!
//! # Invariants
//! - `database_path` is never empty.
//! - `log_level` is always a level accepted by `init_logging`.

use crate::logging::default_log_level;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const DATABASE_PATH_VAR: &str = "IDLINK_DATABASE_PATH";
pub const LOG_LEVEL_VAR: &str = "IDLINK_LOG_LEVEL";
pub const LOG_DIR_VAR: &str = "IDLINK_LOG_DIR";

const KNOWN_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "warning", "error"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidValue { var: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingVar(var) => write!(f, "environment variable `{var}` is required"),
            Self::InvalidValue { var, value } => {
                write!(f, "invalid value `{value}` for `{var}`")
            }
        }
    }
}

impl Error for ConfigError {}

/// Settings needed to run identification against a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    pub database_path: PathBuf,
    pub log_level: String,
    /// File logging stays disabled when unset.
    pub log_dir: Option<PathBuf>,
}

impl IdentityConfig {
    /// Reads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let database_path = read(DATABASE_PATH_VAR)
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingVar(DATABASE_PATH_VAR))?;

        let log_level = match read(LOG_LEVEL_VAR) {
            Some(level) if KNOWN_LEVELS.contains(&level.to_ascii_lowercase().as_str()) => level,
            Some(level) => {
                return Err(ConfigError::InvalidValue {
                    var: LOG_LEVEL_VAR,
                    value: level,
                })
            }
            None => default_log_level().to_string(),
        };

        Ok(Self {
            database_path,
            log_level,
            log_dir: read(LOG_DIR_VAR).map(PathBuf::from),
        })
    }
}
