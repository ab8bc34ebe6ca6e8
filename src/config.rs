use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use thiserror::Error;

pub const DATABASE_URL_VARS: [&str; 2] = ["PGQ_DATABASE_URL", "DATABASE_URL"];
pub const DATABASE_CONFIG_VAR: &str = "PGQ_DATABASE_CONFIG";
pub const ENV_VAR: &str = "PGQ_ENV";
pub const DEFAULT_ENV: &str = "development";

const DEFAULT_PORT: u16 = 5432;

/// Errors raised while resolving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid database url: {0}")]
    InvalidUrl(#[source] sqlx::Error),

    #[error("Could not read database config file '{}': {source}", .path.display())]
    ReadConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid database config file '{}': {source}", .path.display())]
    ParseConfigFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Database config file '{}' has no entry for environment '{env}'", .path.display())]
    MissingEnvironment { path: PathBuf, env: String },

    #[error("Invalid value '{value}' for {name}")]
    InvalidValue { name: &'static str, value: String },
}

/// One environment entry of a database config file.
///
/// ```json
/// {
///   "development": { "host": "localhost", "database": "app_dev", "username": "app" },
///   "production": { "host": "%2Fvar%2Frun%2Fpostgresql", "port": 6432, "database": "app" }
/// }
/// ```
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .port(self.port)
            .database(&self.database);

        if let Some(host) = &self.host {
            let host = decode_socket_host(host);
            options = if host.starts_with('/') {
                options.socket(host)
            } else {
                options.host(&host)
            };
        }
        if let Some(username) = &self.username {
            options = options.username(username);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }

        options
    }
}

/// A host written as `%2Fvar%2Frun%2Fpostgresql` names a unix socket directory.
fn decode_socket_host(host: &str) -> String {
    if host.get(..3).is_some_and(|prefix| prefix.eq_ignore_ascii_case("%2F")) {
        host.replace("%2F", "/").replace("%2f", "/")
    } else {
        host.to_string()
    }
}

/// Where the worker gets its connection settings from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionSource {
    /// A `postgres://` url
    Url(String),
    /// A JSON file keyed by environment name
    ConfigFile { path: PathBuf, env: String },
}

impl ConnectionSource {
    /// Resolves the source from the process environment.
    ///
    /// `PGQ_DATABASE_URL` wins over `DATABASE_URL`; without either,
    /// `PGQ_DATABASE_CONFIG` names a config file whose `PGQ_ENV` entry
    /// (default `development`) is used.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(url) = DATABASE_URL_VARS.iter().find_map(|name| non_empty(name)) {
            return Some(ConnectionSource::Url(url));
        }

        non_empty(DATABASE_CONFIG_VAR).map(|path| ConnectionSource::ConfigFile {
            path: PathBuf::from(path),
            env: non_empty(ENV_VAR).unwrap_or_else(|| DEFAULT_ENV.to_string()),
        })
    }

    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        match self {
            ConnectionSource::Url(url) => url.parse().map_err(ConfigError::InvalidUrl),
            ConnectionSource::ConfigFile { path, env } => {
                Ok(read_database_config(path, env)?.connect_options())
            }
        }
    }
}

/// Reads the `env` entry of a database config file.
pub fn read_database_config(path: &Path, env: &str) -> Result<DatabaseConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadConfigFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_database_config(&contents, env).map_err(|e| match e {
        ConfigError::ParseConfigFile { source, .. } => ConfigError::ParseConfigFile {
            path: path.to_path_buf(),
            source,
        },
        ConfigError::MissingEnvironment { env, .. } => ConfigError::MissingEnvironment {
            path: path.to_path_buf(),
            env,
        },
        other => other,
    })
}

fn parse_database_config(contents: &str, env: &str) -> Result<DatabaseConfig, ConfigError> {
    let mut environments: HashMap<String, DatabaseConfig> = serde_json::from_str(contents)
        .map_err(|source| ConfigError::ParseConfigFile {
            path: PathBuf::new(),
            source,
        })?;

    environments
        .remove(env)
        .ok_or_else(|| ConfigError::MissingEnvironment {
            path: PathBuf::new(),
            env: env.to_string(),
        })
}
