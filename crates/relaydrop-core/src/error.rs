//! Error types for RelayDrop.
//!
//! This module provides a unified error type for local faults. Protocol-level
//! outcomes (a canceled transfer, a receiver still waiting for its peer, a
//! completion that arrived with gaps) are not errors: they are reported as
//! session phases by [`crate::session`].

use std::io;

use thiserror::Error;

/// A specialized `Result` type for RelayDrop operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for RelayDrop.
#[derive(Error, Debug)]
pub enum Error {
    /// Room code is not exactly six decimal digits (E001)
    #[error("invalid room code: {0}")]
    InvalidCodeFormat(String),

    /// Send requested with no files selected (E002)
    #[error("no files selected")]
    NoFiles,

    /// File not found (E003)
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Cannot connect to the relay (E004)
    #[error("unable to reach relay at {url}: {reason}")]
    RelayUnreachable {
        /// Relay URL
        url: String,
        /// Reason for failure
        reason: String,
    },

    /// Relay link closed while a session still needed it (E005)
    #[error("relay connection closed")]
    RelayClosed,

    /// Share link could not be parsed
    #[error("invalid share link: {0}")]
    InvalidLink(String),

    /// Operation not allowed in the session's current phase
    #[error("cannot {operation} while session is {phase}")]
    InvalidPhase {
        /// Operation attempted
        operation: &'static str,
        /// Phase the session was in
        phase: String,
    },

    /// Building or reading a multi-file archive failed
    #[error("archive error: {0}")]
    Archive(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Archive(e.to_string())
    }
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidCodeFormat(_) => Some("E001"),
            Self::NoFiles => Some("E002"),
            Self::FileNotFound(_) => Some("E003"),
            Self::RelayUnreachable { .. } => Some("E004"),
            Self::RelayClosed => Some("E005"),
            _ => None,
        }
    }

    /// Returns whether this error is recoverable (can be retried).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::RelayUnreachable { .. } | Self::RelayClosed)
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::InvalidCodeFormat(_) => Some("Room codes are exactly 6 digits, e.g. 482913."),
            Self::RelayUnreachable { .. } => Some(
                "Check the relay URL (relaydrop config get relay.url)\n\
                 or start one locally: relaydrop relay",
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::InvalidCodeFormat("x".into()).code(), Some("E001"));
        assert_eq!(Error::NoFiles.code(), Some("E002"));
        assert_eq!(Error::RelayClosed.code(), Some("E005"));
        assert_eq!(Error::Internal("x".into()).code(), None);
    }

    #[test]
    fn test_recoverable() {
        assert!(Error::RelayClosed.is_recoverable());
        assert!(!Error::NoFiles.is_recoverable());
    }

    #[test]
    fn test_zip_error_conversion() {
        let err: Error = zip::result::ZipError::FileNotFound.into();
        assert!(matches!(err, Error::Archive(_)));
    }
}
