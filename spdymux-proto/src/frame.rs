//! # Frame Types (SPDY/3 Section 2.6)
//!
//! Semantic frames exchanged between a connection and its peer. Each frame
//! targets exactly one stream.
//!
//! ## Frame Classification:
//! - **Stream opening**: SYN_STREAM (open), SYN_REPLY (acknowledge)
//! - **Stream content**: HEADERS, DATA (both may carry FIN)
//! - **Stream termination**: RST_STREAM (abrupt, carries a status)

use crate::headers::Headers;
use crate::types::{Priority, RstStatus, StreamId};
use bytes::Bytes;

/// SYN_STREAM Frame
///
/// Opens a new stream and carries its request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynStreamFrame {
    /// Id of the stream being opened
    pub stream_id: StreamId,

    /// Stream this one was spawned from, if any
    pub associated_to: Option<StreamId>,

    /// Advisory priority announced to the peer
    pub priority: Priority,

    /// Sender will send nothing further on this stream
    pub fin: bool,

    /// Opening headers
    pub headers: Headers,
}

/// SYN_REPLY Frame
///
/// Acknowledges a stream opened by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynReplyFrame {
    pub stream_id: StreamId,
    pub fin: bool,
    pub headers: Headers,
}

/// HEADERS Frame
///
/// Additional headers sent mid-stream, distinct from the opening and reply headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersFrame {
    pub stream_id: StreamId,
    pub fin: bool,
    pub headers: Headers,
}

/// DATA Frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub stream_id: StreamId,

    /// Last frame the sender will send on this stream
    pub fin: bool,

    /// Payload (reference-counted)
    pub data: Bytes,
}

/// RST_STREAM Frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RstStreamFrame {
    pub stream_id: StreamId,
    pub status: RstStatus,
}

/// Any frame addressed to a single stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    SynStream(SynStreamFrame),
    SynReply(SynReplyFrame),
    Headers(HeadersFrame),
    Data(DataFrame),
    RstStream(RstStreamFrame),
}

impl Frame {
    /// Stream the frame is addressed to
    pub fn stream_id(&self) -> StreamId {
        match self {
            Frame::SynStream(f) => f.stream_id,
            Frame::SynReply(f) => f.stream_id,
            Frame::Headers(f) => f.stream_id,
            Frame::Data(f) => f.stream_id,
            Frame::RstStream(f) => f.stream_id,
        }
    }

    /// Whether the frame carries the FIN flag. RST_STREAM never does.
    pub fn is_fin(&self) -> bool {
        match self {
            Frame::SynStream(f) => f.fin,
            Frame::SynReply(f) => f.fin,
            Frame::Headers(f) => f.fin,
            Frame::Data(f) => f.fin,
            Frame::RstStream(_) => false,
        }
    }

    /// Short frame name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::SynStream(_) => "SYN_STREAM",
            Frame::SynReply(_) => "SYN_REPLY",
            Frame::Headers(_) => "HEADERS",
            Frame::Data(_) => "DATA",
            Frame::RstStream(_) => "RST_STREAM",
        }
    }
}

impl From<SynStreamFrame> for Frame {
    fn from(frame: SynStreamFrame) -> Self {
        Frame::SynStream(frame)
    }
}

impl From<SynReplyFrame> for Frame {
    fn from(frame: SynReplyFrame) -> Self {
        Frame::SynReply(frame)
    }
}

impl From<HeadersFrame> for Frame {
    fn from(frame: HeadersFrame) -> Self {
        Frame::Headers(frame)
    }
}

impl From<DataFrame> for Frame {
    fn from(frame: DataFrame) -> Self {
        Frame::Data(frame)
    }
}

impl From<RstStreamFrame> for Frame {
    fn from(frame: RstStreamFrame) -> Self {
        Frame::RstStream(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_accessors() {
        let data: Frame = DataFrame {
            stream_id: StreamId(3),
            fin: true,
            data: Bytes::from_static(b"abc"),
        }
        .into();
        assert_eq!(data.stream_id(), StreamId(3));
        assert!(data.is_fin());
        assert_eq!(data.kind(), "DATA");

        let rst: Frame = RstStreamFrame {
            stream_id: StreamId(5),
            status: RstStatus::Cancel,
        }
        .into();
        assert_eq!(rst.stream_id(), StreamId(5));
        assert!(!rst.is_fin());
        assert_eq!(rst.kind(), "RST_STREAM");
    }

    #[test]
    fn test_syn_stream_carries_association() {
        let frame: Frame = SynStreamFrame {
            stream_id: StreamId(7),
            associated_to: Some(StreamId(1)),
            priority: Priority::HIGHEST,
            fin: false,
            headers: Headers::new(),
        }
        .into();

        match frame {
            Frame::SynStream(syn) => {
                assert_eq!(syn.associated_to, Some(StreamId(1)));
                assert_eq!(syn.priority, Priority::HIGHEST);
            }
            other => panic!("unexpected frame {:?}", other.kind()),
        }
    }
}
