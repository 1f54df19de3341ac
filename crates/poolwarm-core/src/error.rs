//! Error types for poolwarm.

use crate::timing::Phase;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Server errors
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Buffer pool introspection unavailable: {0}")]
    IntrospectionUnavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    // Image errors
    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("Image corrupt: {0}")]
    ImageCorrupt(String),

    #[error("Image version mismatch: {format} v{found} is not readable by this build (supports up to v{supported})")]
    ImageVersionMismatch {
        format: String,
        found: u32,
        supported: u32,
    },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{phase} phase failed: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: Box<Error>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Attach the phase an error surfaced in. Already-tagged errors keep
    /// their innermost phase.
    pub fn in_phase(self, phase: Phase) -> Self {
        match self {
            Error::Phase { .. } => self,
            other => Error::Phase {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// The phase this error was tagged with, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Error::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// The underlying error with any phase tagging stripped.
    pub fn root(&self) -> &Error {
        match self {
            Error::Phase { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            timeout,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
