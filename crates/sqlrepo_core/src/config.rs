//! Connection pool configuration.
//!
//! Values come from an optional TOML file (`[database]` section) overlaid
//! with `SQLREPO__DATABASE__*` environment variables. Every field has a
//! default, so an empty source yields a private in-memory database.

use crate::db::DatabaseTarget;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "SQLREPO";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolConfig {
    /// Database file. `None` means a fresh shared in-memory database.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Pool size for file databases. In-memory pools always hold one.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    4
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_timeout_ms(),
            busy_timeout_ms: default_timeout_ms(),
        }
    }
}

impl PoolConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Loads the `[database]` section from `file` (when given) and the
    /// environment. A missing section falls back to defaults.
    ///
    /// # Errors
    /// - Returns `ConfigError` when the file is unreadable or a value has the
    ///   wrong type.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        match settings.get::<PoolConfig>("database") {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(err) => Err(err),
        }
    }

    /// Resolves the connection target.
    ///
    /// Each call without `path` names a new in-memory database, so resolve
    /// once per pool.
    pub fn target(&self) -> DatabaseTarget {
        match &self.path {
            Some(path) => DatabaseTarget::File(path.clone()),
            None => DatabaseTarget::unique_memory(),
        }
    }
}
