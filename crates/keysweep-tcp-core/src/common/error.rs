//! Error types for the keysweep allocator and workers.
//!
//! This module defines the central `Error` enum shared by both sides of the
//! line protocol. Every variant is classified as transient or not through
//! [`Error::is_transient`]: transient failures abandon the current work cycle
//! and let the worker re-probe the allocator, anything else points at a
//! misbehaving peer or a bad configuration.
//!
//! ## Error Cases
//! - `Io`: A socket operation failed (refused, reset, broken pipe).
//! - `Timeout`: A connect or read did not complete in time.
//! - `ConnectionClosed`: The peer closed the stream before answering.
//! - `LineTooLong`: The peer sent a line longer than the framing limit.
//! - `Malformed`: A message did not follow the line protocol.
//! - `Rejected`: The allocator answered a request with an error line.
//! - `KeySpace`: The parameters of a run were invalid.
//! - `Task`: A background task panicked or was cancelled.

use core::time::Duration;
use std::io;
use tokio_util::codec::AnyDelimiterCodecError;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the keysweep line protocol.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Underlying socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A connect or read exceeded its deadline.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The peer closed the connection before a response arrived.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// The peer exceeded the maximum line length.
    #[error("Line exceeds the maximum length of {max} bytes")]
    LineTooLong { max: usize },

    /// A message could not be parsed.
    #[error("Malformed message: {reason}")]
    Malformed { reason: String },

    /// The allocator refused a request.
    #[error("Rejected by allocator: {reason}")]
    Rejected { reason: String },

    /// The key-space or initial key was invalid.
    #[error("Invalid key-space: {0}")]
    KeySpace(#[from] keysweep::Error),

    /// A spawned task failed to complete.
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    /// Returns `true` for failures worth another attempt on a fresh
    /// connection.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Timeout(_) | Self::ConnectionClosed
        )
    }

    /// Maps the framing error of a stream limited to `max` bytes per line.
    pub fn from_codec(err: AnyDelimiterCodecError, max: usize) -> Self {
        match err {
            AnyDelimiterCodecError::MaxChunkLengthExceeded => Self::LineTooLong { max },
            AnyDelimiterCodecError::Io(e) => Self::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_failures_are_transient() {
        let refused = Error::from(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(refused.is_transient());
        assert!(Error::Timeout(Duration::from_millis(5)).is_transient());
        assert!(Error::ConnectionClosed.is_transient());
    }

    #[test]
    fn protocol_failures_are_not_transient() {
        assert!(!Error::malformed("garbage").is_transient());
        assert!(!Error::LineTooLong { max: 16 }.is_transient());
        assert!(
            !Error::Rejected {
                reason: "nope".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn codec_errors_keep_their_meaning() {
        let err = Error::from_codec(AnyDelimiterCodecError::MaxChunkLengthExceeded, 64);
        assert!(matches!(err, Error::LineTooLong { max: 64 }));
        assert_eq!(err.to_string(), "Line exceeds the maximum length of 64 bytes");

        let err = Error::from_codec(
            AnyDelimiterCodecError::Io(io::Error::from(io::ErrorKind::ConnectionReset)),
            64,
        );
        assert!(err.is_transient());
    }
}
