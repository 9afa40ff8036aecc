//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default MongoDB connection string.
pub const DEFAULT_MONGODB_URI: &str = "mongodb://localhost:27017";

/// Default database every resource and tool operates on.
pub const DEFAULT_DATABASE_NAME: &str = "my_mcp_db_sync";

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// MongoDB connection settings.
    #[serde(default)]
    pub mongodb: MongoConfig,

    /// Request handling settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.mongodb.uri.starts_with("mongodb://")
            && !self.mongodb.uri.starts_with("mongodb+srv://")
        {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid MongoDB URI '{}'. Must start with mongodb:// or mongodb+srv://",
                    super::redact_uri(&self.mongodb.uri)
                ),
            });
        }

        let name = &self.mongodb.database;
        if name.is_empty() || name.contains(['/', '\\', '.', ' ', '"', '$']) {
            return Err(ConfigError::ValidationError {
                message: format!("Invalid database name '{name}'"),
            });
        }

        if self.server.request_timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError {
                message: "request_timeout_ms must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Overrides settings from environment variables.
    ///
    /// `lookup` is normally `std::env::var`; `MONGODB_URI` replaces the
    /// configured connection string when set and non-empty.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup(super::MONGODB_URI_ENV).filter(|v| !v.trim().is_empty()) {
            self.mongodb.uri = uri;
        }
    }
}

/// MongoDB connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MongoConfig {
    /// Connection string.
    /// Default: "mongodb://localhost:27017"
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Database name.
    /// Default: "`my_mcp_db_sync`"
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: default_database(),
        }
    }
}

fn default_uri() -> String {
    DEFAULT_MONGODB_URI.to_string()
}

fn default_database() -> String {
    DEFAULT_DATABASE_NAME.to_string()
}

/// Request handling settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Upper bound for a single datastore call, in milliseconds.
    /// Unset means calls may run indefinitely.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl ServerConfig {
    /// The request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
