//! Configuration loading
//!
//! Loads server connection configuration from environment variables,
//! optionally reading from a .env file first.

use crate::prelude::InfoError;
use std::{env, path::Path};
use tracing::{debug, error, trace, warn};

/// Server connection configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    /// Initial database; the driver default is used when unset
    pub database: Option<String>,
    pub user: String,
    pub password: Option<String>,
    /// Connect timeout in seconds
    pub connect_timeout: Option<u64>,
}

impl DbConfig {
    /// Load configuration from environment variables
    ///
    /// Expected variables:
    /// - DB_HOST (default: localhost)
    /// - DB_PORT (default: 5432)
    /// - DB_USER (required)
    /// - DB_PASSWORD (optional)
    /// - DB_NAME (optional)
    /// - DB_CONNECT_TIMEOUT (optional, seconds)
    pub fn from_env() -> Result<Self, InfoError> {
        debug!("Loading database configuration from environment");
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, InfoError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("DB_HOST").unwrap_or_else(|| {
            trace!("DB_HOST not set, using default");
            "localhost".to_string()
        });

        let port_str = lookup("DB_PORT").unwrap_or_else(|| {
            trace!("DB_PORT not set, using default");
            "5432".to_string()
        });

        let port = port_str.parse::<u16>().map_err(|e| {
            error!(port = ?port_str, error = ?e, "Invalid DB_PORT value");
            InfoError::Config("DB_PORT must be a valid port number".to_string())
        })?;

        let user = lookup("DB_USER").ok_or_else(|| {
            error!("DB_USER environment variable is not set");
            InfoError::Config("DB_USER environment variable is required".to_string())
        })?;

        let password = lookup("DB_PASSWORD").filter(|p| !p.is_empty());
        let database = lookup("DB_NAME").filter(|d| !d.is_empty());

        let connect_timeout = match lookup("DB_CONNECT_TIMEOUT") {
            Some(raw) => Some(raw.parse::<u64>().map_err(|e| {
                error!(timeout = ?raw, error = ?e, "Invalid DB_CONNECT_TIMEOUT value");
                InfoError::Config("DB_CONNECT_TIMEOUT must be a number of seconds".to_string())
            })?),
            None => None,
        };

        debug!(host = ?host, port = ?port, database = ?database, user = ?user, "Configuration loaded");

        Ok(Self {
            host,
            port,
            database,
            user,
            password,
            connect_timeout,
        })
    }

    /// Load a .env file and then read configuration from environment
    pub fn load(env_file: &Path) -> Result<Self, InfoError> {
        if env_file.exists() {
            debug!(path = ?env_file, "Loading environment file");
            dotenvy::from_path(env_file).map_err(|e| {
                error!(path = ?env_file, error = ?e, "Failed to load environment file");
                InfoError::Config(format!("Failed to load {}: {}", env_file.display(), e))
            })?;
        } else {
            warn!(path = ?env_file, "Environment file not found, using existing environment");
        }

        Self::from_env()
    }

    /// Override the initial database
    pub fn with_database(mut self, database: Option<String>) -> Self {
        if database.is_some() {
            self.database = database;
        }
        self
    }

    /// Build a libpq-style connection string for `database`
    ///
    /// `None` leaves out `dbname` so the server default applies.
    pub fn connection_string_for(&self, database: Option<&str>) -> String {
        self.render(database, self.password.as_deref())
    }

    /// Connection string for the configured initial database
    pub fn postgres_connection_string(&self) -> String {
        self.connection_string_for(self.database.as_deref())
    }

    /// Build a connection string with password redacted (for error messages)
    pub fn redacted_connection_string(&self) -> String {
        self.render(
            self.database.as_deref(),
            self.password.as_ref().map(|_| "***"),
        )
    }

    fn render(&self, database: Option<&str>, password: Option<&str>) -> String {
        let mut parts = vec![
            format!("host={}", quote_value(&self.host)),
            format!("port={}", self.port),
            format!("user={}", quote_value(&self.user)),
        ];
        if let Some(password) = password {
            parts.push(format!("password={}", quote_value(password)));
        }
        if let Some(database) = database {
            parts.push(format!("dbname={}", quote_value(database)));
        }
        if let Some(timeout) = self.connect_timeout {
            parts.push(format!("connect_timeout={}", timeout));
        }
        parts.join(" ")
    }
}

/// Quote a connection string value when it contains spaces or quotes
fn quote_value(value: &str) -> String {
    let plain = !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if plain {
        return value.to_string();
    }

    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}
