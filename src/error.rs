//! Error types for the conformance harness

use std::path::{Path, PathBuf};
use thiserror::Error;

/// A fixture that could not be turned into a [`TestDescriptor`](crate::fixture::TestDescriptor).
///
/// The loader yields these in place of a descriptor so the runner can still
/// record exactly one outcome for the offending file, keyed by `id`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}: {reason}", .path.display())]
pub struct MalformedFixture {
    /// Discovery position of the fixture
    pub index: usize,
    /// Identity used for reporting (root-relative path)
    pub id: String,
    /// Path of the fixture relative to the suite root
    pub path: PathBuf,
    /// Why the fixture was rejected
    pub reason: String,
}

impl MalformedFixture {
    pub fn new(index: usize, id: impl Into<String>, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            index,
            id: id.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    /// A fixture could not be read or identified
    #[error("MalformedFixture: {0}")]
    MalformedFixture(#[from] MalformedFixture),

    /// The target runtime could not provide a fresh execution context
    #[error("ContextCreationFailed: {0}")]
    ContextCreationFailed(String),

    /// The aggregator received a second outcome for the same test id
    #[error("DuplicateOutcome: test '{0}' reported more than once")]
    DuplicateOutcome(String),

    /// The run was aborted before the operation completed
    #[error("Cancelled: run aborted")]
    Cancelled,

    /// Invalid configuration
    #[error("ConfigError: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IOError: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    /// JSON encoding or decoding error
    #[error("JsonError: {source}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },
}

impl Error {
    /// Create a context creation failure
    pub fn context_creation(message: impl Into<String>) -> Self {
        Error::ContextCreationFailed(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::ConfigError(message.into())
    }

    /// Create a configuration error about a specific file
    pub fn config_file(path: &Path, message: impl std::fmt::Display) -> Self {
        Error::ConfigError(format!("{}: {}", path.display(), message))
    }

    /// Whether this error must abort the whole run rather than a single test
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ContextCreationFailed(_) | Error::DuplicateOutcome(_))
    }
}

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, Error>;
