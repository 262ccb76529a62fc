//! Error types for protocol value construction.

use thiserror::Error;

/// Error raised when a protocol value is out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtoError {
    /// Priority outside the 0 (highest) ..= 7 (lowest) range.
    #[error("Invalid priority: {0} (expected 0..=7)")]
    InvalidPriority(u8),

    /// Reset status code not defined by the protocol.
    #[error("Unknown reset status code: {0}")]
    UnknownStatus(u32),
}
