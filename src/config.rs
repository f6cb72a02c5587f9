//! Configuration for a snapshot run
//!
//! Connection settings come from the environment (optionally seeded from a
//! `.env` file), with command-line values taking precedence.

use crate::error::{Result, SnapshotError};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_OUTPUT: &str = "database_metadata.json";
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Parameters handed to the driver as-is
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

/// Values supplied on the command line. `None` falls back to the environment.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub output: Option<PathBuf>,
}

/// Everything a run needs
#[derive(Clone, Debug)]
pub struct SnapshotConfig {
    pub connection: ConnectionConfig,
    /// Namespace whose objects are extracted
    pub schema: String,
    /// Destination of the JSON document
    pub output: PathBuf,
}

impl SnapshotConfig {
    /// Load the dotenv file, then resolve settings from the process environment.
    ///
    /// An explicitly named env file must exist; the default `.env` is optional.
    pub fn load(env_file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| {
                    SnapshotError::Config(format!("cannot load {}: {}", path.display(), e))
                })?;
                debug!(path = %path.display(), "loaded env file");
            }
            None => {
                if dotenvy::from_filename(DEFAULT_ENV_FILE).is_ok() {
                    debug!("loaded {}", DEFAULT_ENV_FILE);
                }
            }
        }

        Self::from_lookup(|key| std::env::var(key).ok(), overrides)
    }

    /// Resolve settings through `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F, overrides: &Overrides) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str, value: Option<String>| {
            value
                .or_else(|| lookup(key))
                .ok_or_else(|| SnapshotError::Config(format!("{} is not set", key)))
        };

        let host = required("DB_HOST", overrides.host.clone())?;
        let user = required("DB_USER", overrides.user.clone())?;
        let password = required("DB_PASSWORD", None)?;
        let database = required("DB_NAME", overrides.database.clone())?;

        let port = match overrides.port {
            Some(port) => port,
            None => {
                let raw = required("DB_PORT", None)?;
                raw.trim().parse::<u16>().map_err(|_| {
                    SnapshotError::Config(format!("DB_PORT is not a valid port: {:?}", raw))
                })?
            }
        };

        let schema = overrides
            .schema
            .clone()
            .or_else(|| lookup("DB_SCHEMA"))
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SCHEMA.to_string());

        let output = overrides
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

        Ok(Self {
            connection: ConnectionConfig {
                host,
                port,
                user,
                password,
                database,
            },
            schema,
            output,
        })
    }
}
