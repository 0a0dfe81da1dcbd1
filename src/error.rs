//! Error types for the osdebug crate.

use std::path::Path;
use thiserror::Error;

/// Result type alias for osdebug operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing or finishing a collection run.
///
/// Failures of individual collectors are not errors: they are recorded in
/// the run summary and never surface through this type.
#[derive(Error, Debug)]
pub enum Error {
    /// A backend or its credentials are unusable. Fatal before collection starts.
    #[error("Environment check failed: {reason}")]
    Environment {
        reason: String,
        hint: Option<String>,
    },

    /// Failed to read or write a file or directory.
    #[error("Failed to access {path}: {reason}")]
    IoError { path: String, reason: String },

    /// Failed to serialize or deserialize data.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// The supplied identifiers do not fit the selected mode.
    #[error("Invalid identifiers: {0}")]
    InvalidIdentifiers(String),

    /// Failed to compress the output bundle.
    #[error("Failed to archive {path}: {reason}")]
    ArchiveError { path: String, reason: String },
}

impl Error {
    /// Build an environment error with an operator hint.
    pub fn environment(reason: impl Into<String>, hint: impl Into<String>) -> Self {
        Error::Environment {
            reason: reason.into(),
            hint: Some(hint.into()),
        }
    }

    /// Build an I/O error tagged with the path involved.
    pub fn io(path: &Path, err: std::io::Error) -> Self {
        Error::IoError {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    /// Operator hint attached to the error, if any.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Error::Environment { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError {
            path: String::new(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::ArchiveError {
            path: String::new(),
            reason: err.to_string(),
        }
    }
}
