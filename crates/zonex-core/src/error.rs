//! Error types for the zonex pipeline
//!
//! Record-level errors (malformed lines, duplicate keys, sink write failures,
//! invariant violations) are absorbed by the engine and counted. Stream-level
//! errors (the source cannot be read) end the run.

use thiserror::Error;

/// Result type alias for zonex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the zonex pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Line failed classification
    #[error("Malformed line: {0}")]
    MalformedLine(String),

    /// The sink already holds this key
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Any other persistence failure
    #[error("Sink write failed: {0}")]
    SinkWrite(String),

    /// The input stream cannot be read any further
    #[error("Source read failed: {0}")]
    SourceRead(#[source] std::io::Error),

    /// A closed, accepted line parsed to an empty record
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem errors outside the input stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a malformed line error
    pub fn malformed_line(msg: impl Into<String>) -> Self {
        Self::MalformedLine(msg.into())
    }

    /// Create a duplicate key error
    pub fn duplicate_key(key: impl Into<String>) -> Self {
        Self::DuplicateKey(key.into())
    }

    /// Create a sink write error
    pub fn sink_write(msg: impl Into<String>) -> Self {
        Self::SinkWrite(msg.into())
    }

    /// Create an invariant violation error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
