//! Error types for mongo-mcp.
//!
//! # Security Note
//!
//! Connection strings can embed credentials. Every variant that mentions a
//! MongoDB URI carries the redacted form produced by
//! [`crate::config::redact_uri`], never the raw value.

use std::path::PathBuf;

use thiserror::Error;

use crate::db::DbError;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised while resolving or validating a single request.
///
/// None of these are fatal: the server turns each one into a structured
/// response for the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No registered template matches the URI.
    #[error("Resource not found: {uri}")]
    ResourceNotFound {
        /// The URI that failed to resolve.
        uri: String,
    },

    /// No tool is registered under this name.
    #[error("Unknown tool: {name}")]
    ToolNotFound {
        /// The requested tool name.
        name: String,
    },

    /// No prompt is registered under this name.
    #[error("Unknown prompt: {name}")]
    PromptNotFound {
        /// The requested prompt name.
        name: String,
    },

    /// The caller supplied arguments of the wrong shape.
    #[error("{message}")]
    Validation {
        /// Description of what's wrong.
        message: String,
    },
}

impl DispatchError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Errors detected while building the routing tables at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The URI template could not be parsed.
    #[error("invalid URI template '{template}': {message}")]
    InvalidTemplate {
        /// The offending template.
        template: String,
        /// Description of what's wrong.
        message: String,
    },

    /// Two templates would both match some URI with no precedence between them.
    #[error("URI template '{template}' is ambiguous with '{existing}'")]
    AmbiguousTemplate {
        /// The template being registered.
        template: String,
        /// The already registered template it conflicts with.
        existing: String,
    },

    /// A tool or prompt with this name already exists.
    #[error("{kind} '{name}' is already registered")]
    Duplicate {
        /// "tool" or "prompt".
        kind: &'static str,
        /// The duplicated name.
        name: String,
    },
}

/// Top-level errors that stop the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The datastore connection could not be established.
    #[error(transparent)]
    Connection(#[from] DbError),

    /// The routing tables could not be built.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// Transport I/O failed.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}
