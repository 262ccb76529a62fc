//! Error types for stream operations.
//!
//! Every error is returned to the immediate caller and never retried
//! internally. None of them is fatal beyond the stream it concerns.

use spdymux_proto::{ProtoError, RstStatus};
use std::io;
use thiserror::Error;

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Cause delivered through a stream's acknowledgement slot.
///
/// Cloneable because every waiter on the reply gate observes the same cause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    /// Peer refused the stream before any data flowed.
    #[error("stream refused by peer")]
    Refused,

    /// Stream was reset before it was acknowledged.
    #[error("stream reset ({0})")]
    Reset(RstStatus),

    /// Connection-level failure reported by the connection.
    #[error("connection failure: {0}")]
    Connection(String),
}

/// Error type for stream operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Write attempted after the local side already signaled finish.
    #[error("write on closed stream")]
    WriteClosedStream,

    /// No reply arrived within the wait timeout.
    #[error("timeout waiting for reply")]
    Timeout,

    /// Acknowledgement delivered a failure instead of success.
    #[error("stream failed: {0}")]
    Failed(#[from] Failure),

    /// Reply attempted on a stream this side initiated.
    #[error("cannot reply on initiated stream")]
    InvalidReply,

    /// Header queue closed without delivering a value.
    #[error("header queue closed")]
    HeaderQueueClosed,

    /// Stream closed while waiting for inbound headers.
    #[error("stream closed")]
    StreamClosed,

    /// The connection owning the stream has been dropped.
    #[error("connection is gone")]
    ConnectionGone,

    /// I/O error from the frame sink or transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid protocol value.
    #[error("protocol error: {0}")]
    Proto(#[from] ProtoError),
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::Io(inner) => inner.kind(),
            Error::WriteClosedStream => io::ErrorKind::BrokenPipe,
            Error::Timeout => io::ErrorKind::TimedOut,
            Error::Failed(Failure::Refused) => io::ErrorKind::ConnectionRefused,
            Error::Failed(Failure::Reset(_)) => io::ErrorKind::ConnectionReset,
            Error::Failed(Failure::Connection(_)) | Error::ConnectionGone => {
                io::ErrorKind::NotConnected
            }
            Error::InvalidReply | Error::Proto(_) => io::ErrorKind::InvalidInput,
            Error::HeaderQueueClosed | Error::StreamClosed => io::ErrorKind::UnexpectedEof,
        };
        match err {
            Error::Io(inner) => inner,
            other => io::Error::new(kind, other),
        }
    }
}
