//! Raw failure values produced by guarded operations
//!
//! A [`Failure`] is the unit the classifier reasons about: an error *name*
//! (e.g. `TypeError`, `NetworkError`) and a human-readable *message*. Caller
//! operations return `Result<T, Failure>`; conversions exist for the error
//! types a Wayfinder call site typically meets.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// A failure reported by a caller-supplied operation
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[error("{name}: {message}")]
pub struct Failure {
    /// Error class name, e.g. `TypeError` or `NetworkError`
    pub name: String,
    /// Free-form error message
    pub message: String,
}

impl Failure {
    /// Create a failure with an explicit name
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a generic `Error`
    pub fn error(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    /// Create a `NetworkError`
    pub fn network(message: impl Into<String>) -> Self {
        Self::new("NetworkError", message)
    }

    /// Create a `TimeoutError`
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new("TimeoutError", message)
    }

    /// Create a `TypeError`
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    /// Name and message joined and lowercased, as scanned by the classifier
    pub fn haystack(&self) -> String {
        format!("{} {}", self.name, self.message).to_lowercase()
    }
}

impl From<io::Error> for Failure {
    fn from(error: io::Error) -> Self {
        let name = match error.kind() {
            io::ErrorKind::TimedOut => "TimeoutError",
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable => "NetworkError",
            io::ErrorKind::PermissionDenied => "PermissionError",
            io::ErrorKind::InvalidData => "DataError",
            _ => "IoError",
        };
        Self::new(name, error.to_string())
    }
}

impl From<serde_json::Error> for Failure {
    fn from(error: serde_json::Error) -> Self {
        Self::new("ParseError", format!("json parse error: {}", error))
    }
}

impl From<tokio::time::error::Elapsed> for Failure {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::timeout("operation timed out")
    }
}
