//! # Core Protocol Types
//!
//! Stream identifiers, priorities and reset status codes.

use crate::error::ProtoError;
use core::fmt;

/// Stream Identifier
///
/// Unique within one connection. The low bit encodes the initiator:
/// client-initiated streams are odd, server-initiated streams are even.
/// Id 0 is never assigned to a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u32);

impl StreamId {
    /// Create a new StreamId
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw value
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Check if this stream was opened by the client side
    pub fn is_client_initiated(&self) -> bool {
        (self.0 & 0x1) == 1
    }

    /// Check if this stream was opened by the server side
    pub fn is_server_initiated(&self) -> bool {
        self.0 != 0 && (self.0 & 0x1) == 0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StreamId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Stream Priority
///
/// 0 is the highest priority and 7 the lowest. Purely advisory: it is
/// announced in SYN_STREAM and may be consulted by a write scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Priority(u8);

impl Priority {
    /// Highest priority (0)
    pub const HIGHEST: Priority = Priority(0);

    /// Lowest priority (7)
    pub const LOWEST: Priority = Priority(7);

    /// Create a priority, rejecting values above 7.
    pub fn new(value: u8) -> Result<Self, ProtoError> {
        if value > Self::LOWEST.0 {
            return Err(ProtoError::InvalidPriority(value));
        }
        Ok(Self(value))
    }

    /// Get the raw value
    pub const fn value(&self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::LOWEST
    }
}

impl TryFrom<u8> for Priority {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// RST_STREAM Status Codes (SPDY/3 Section 2.6.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RstStatus {
    /// Generic error, used when no more specific status applies
    ProtocolError = 1,

    /// Frame received for a stream that is not active
    InvalidStream = 2,

    /// Stream refused before any processing happened
    RefusedStream = 3,

    /// Protocol version not supported by the recipient
    UnsupportedVersion = 4,

    /// Creator of the stream no longer needs it
    Cancel = 5,

    /// Implementation fault unrelated to the protocol
    InternalError = 6,

    /// Peer violated flow control
    FlowControlError = 7,

    /// SYN_STREAM received for a stream that is already open
    StreamInUse = 8,

    /// Data or SYN_REPLY received for a half-closed stream
    StreamAlreadyClosed = 9,

    /// Credential not valid for the stream's origin
    InvalidCredentials = 10,

    /// Frame too large for the recipient to process
    FrameTooLarge = 11,
}

impl RstStatus {
    /// Parse a wire status code.
    pub fn from_u32(code: u32) -> Result<Self, ProtoError> {
        let status = match code {
            1 => RstStatus::ProtocolError,
            2 => RstStatus::InvalidStream,
            3 => RstStatus::RefusedStream,
            4 => RstStatus::UnsupportedVersion,
            5 => RstStatus::Cancel,
            6 => RstStatus::InternalError,
            7 => RstStatus::FlowControlError,
            8 => RstStatus::StreamInUse,
            9 => RstStatus::StreamAlreadyClosed,
            10 => RstStatus::InvalidCredentials,
            11 => RstStatus::FrameTooLarge,
            other => return Err(ProtoError::UnknownStatus(other)),
        };
        Ok(status)
    }

    /// Wire status code
    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for RstStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RstStatus::ProtocolError => "PROTOCOL_ERROR",
            RstStatus::InvalidStream => "INVALID_STREAM",
            RstStatus::RefusedStream => "REFUSED_STREAM",
            RstStatus::UnsupportedVersion => "UNSUPPORTED_VERSION",
            RstStatus::Cancel => "CANCEL",
            RstStatus::InternalError => "INTERNAL_ERROR",
            RstStatus::FlowControlError => "FLOW_CONTROL_ERROR",
            RstStatus::StreamInUse => "STREAM_IN_USE",
            RstStatus::StreamAlreadyClosed => "STREAM_ALREADY_CLOSED",
            RstStatus::InvalidCredentials => "INVALID_CREDENTIALS",
            RstStatus::FrameTooLarge => "FRAME_TOO_LARGE",
        };
        write!(f, "{}", name)
    }
}
