//! Error and outcome types shared by every adapter operation.
//!
//! Two severities are modeled when an adapter reports a problem to its host:
//!
//! - **Recoverable**: the message goes to the log and execution continues
//! - **Fatal**: the message goes to the log and the process terminates abnormally
//!
//! Normal termination is not an error and has no severity; it goes through
//! `HostEngine::exit` only.
//!
//! "Not implemented" is not a severity. It is a distinct [`ProxyError`] variant
//! returned by every capability a host chooses not to supply, so that callers can
//! tell "operation failed" apart from "operation unsupported" and skip a feature
//! instead of aborting.
//!
//! Library code never terminates the process. Helpers return a [`ProxyError`]
//! and the driving [`Session`](crate::session::Session) routes it to the host's
//! `error` or `fatal_error` according to [`ProxyError::severity`].

use crate::settings::ConfigError;
use thiserror::Error;

/// Error type for adapter operations.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Generic I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A file could not be created, opened or written
    #[error("cannot write to file \"{path}\": {source}")]
    File {
        /// Path of the file that failed
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },
    /// The caller passed an invalid argument (bad index, unknown field, ...)
    #[error("Input error: {0}")]
    Input(String),
    /// Structure or coordinate data could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),
    /// Internal bookkeeping violated; indicates a defect in the calling code
    #[error("Internal consistency error: {0}")]
    Bug(String),
    /// The host does not provide this capability
    #[error("{0} is not implemented by this host")]
    NotImplemented(String),
    /// Frame-based addressing referred to a frame that does not exist
    #[error("no such frame: {0}")]
    NoSuchFrame(usize),
    /// Replica communication failed
    #[error("Replica communication error: {0}")]
    Replica(String),
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result alias used throughout the crate.
pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

/// How the host should react to a reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Log the message and continue
    Recoverable,
    /// Log the message and terminate abnormally
    Fatal,
}

/// Numeric outcome codes exposed to hosts that talk in status integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Success
    Ok,
    /// Generic failure
    Error,
    /// The host does not implement the requested capability
    NotImplemented,
    /// Frame addressing is out of range
    NoSuchFrame,
}

impl ErrorCode {
    /// Raw integer value of the code.
    pub fn as_raw(self) -> i32 {
        match self {
            ErrorCode::Ok => 0,
            ErrorCode::Error => -1,
            ErrorCode::NotImplemented => -2,
            ErrorCode::NoSuchFrame => -1,
        }
    }

    /// Collapses a result into its status code.
    pub fn of<T>(result: &ProxyResult<T>) -> Self {
        match result {
            Ok(_) => ErrorCode::Ok,
            Err(e) => e.code(),
        }
    }
}

impl ProxyError {
    /// Shorthand for a [`ProxyError::NotImplemented`] naming the missing feature.
    pub fn not_implemented(feature: impl Into<String>) -> Self {
        ProxyError::NotImplemented(feature.into())
    }

    /// Returns true when the error means "capability absent" rather than "failed".
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, ProxyError::NotImplemented(_))
    }

    /// Severity with which this error must be reported.
    ///
    /// Input and bug errors come from defects in the calling code and cannot be
    /// recovered from.
    pub fn severity(&self) -> Severity {
        match self {
            ProxyError::Input(_) | ProxyError::Bug(_) => Severity::Fatal,
            _ => Severity::Recoverable,
        }
    }

    /// Status code corresponding to this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ProxyError::NotImplemented(_) => ErrorCode::NotImplemented,
            ProxyError::NoSuchFrame(_) => ErrorCode::NoSuchFrame,
            _ => ErrorCode::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_implemented_is_distinct_from_failure() {
        let unsupported = ProxyError::not_implemented("replica_comm_send");
        let failed = ProxyError::Replica("peer hung up".to_string());

        assert!(unsupported.is_not_implemented());
        assert!(!failed.is_not_implemented());
        assert_eq!(unsupported.code(), ErrorCode::NotImplemented);
        assert_eq!(failed.code(), ErrorCode::Error);
    }

    #[test]
    fn test_severity_classification() {
        assert_eq!(ProxyError::Bug("x".into()).severity(), Severity::Fatal);
        assert_eq!(ProxyError::Input("x".into()).severity(), Severity::Fatal);
        assert_eq!(ProxyError::Parse("x".into()).severity(), Severity::Recoverable);
        assert_eq!(
            ProxyError::not_implemented("velocities").severity(),
            Severity::Recoverable
        );
    }

    #[test]
    fn test_error_code_of_result() {
        let ok: ProxyResult<usize> = Ok(3);
        let frame: ProxyResult<usize> = Err(ProxyError::NoSuchFrame(9));

        assert_eq!(ErrorCode::of(&ok), ErrorCode::Ok);
        assert_eq!(ErrorCode::of(&ok).as_raw(), 0);
        assert_eq!(ErrorCode::of(&frame), ErrorCode::NoSuchFrame);
        assert_eq!(ErrorCode::of(&frame).as_raw(), -1);
        assert_eq!(ErrorCode::NotImplemented.as_raw(), -2);
    }
}
