//! Error types for the SBN client.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::bus::Status;

/// Result type alias for SBN client operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors reported by the codec, the bus binding and the session.
///
/// Nothing here is retried internally. Retry policy belongs to the caller.
#[derive(Error, Debug)]
pub enum BusError {
    /// Buffer too short for the header it should hold. Discard the packet.
    #[error("malformed header: expected at least {expected} bytes, got {actual}")]
    MalformedHeader { expected: usize, actual: usize },

    /// Non-success status from the native library, passed through unmodified.
    #[error("bus library returned status {0}")]
    Status(Status),

    #[error("failed to load bus library {}: {reason}", path.display())]
    LibraryLoad { path: PathBuf, reason: String },

    #[error("bus library does not export `{0}`")]
    MissingSymbol(&'static str),

    #[error("invalid pipe name {0:?}: contains an interior NUL byte")]
    InvalidPipeName(String),

    #[error("encoder buffer full: need {needed} bytes, {available} available")]
    BufferFull { needed: usize, available: usize },

    #[error("message of {size} bytes exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BusError {
    /// True for truncated or inconsistent packets.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedHeader { .. })
    }

    /// The native status code, when this error carries one.
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::Status(status) => Some(*status),
            _ => None,
        }
    }
}

impl From<Status> for BusError {
    fn from(status: Status) -> Self {
        Self::Status(status)
    }
}
