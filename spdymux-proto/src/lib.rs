//! spdymux-proto: Protocol Vocabulary for the spdymux Stream Multiplexer
//!
//! This crate defines the types shared by every layer of a SPDY-style
//! multiplexed connection: stream identifiers, priorities, reset status codes,
//! the ordered header multimap, and typed frames.
//!
//! # Scope
//!
//! - **Identifiers**: `StreamId` with SPDY parity rules (odd = client, even = server)
//! - **Headers**: `Headers`, an ordered name to multi-value map with lower-case names
//! - **Frames**: `Frame` and its payload structs (SYN_STREAM, SYN_REPLY, HEADERS, DATA, RST_STREAM)
//!
//! Bit-level encoding is intentionally absent. Frames here are semantic values
//! handed to a frame sink; how a sink serializes them is its own concern.

#![forbid(unsafe_code)]

pub mod error;
pub mod frame;
pub mod headers;
pub mod types;

pub use error::ProtoError;
pub use frame::{DataFrame, Frame, HeadersFrame, RstStreamFrame, SynReplyFrame, SynStreamFrame};
pub use headers::Headers;
pub use types::{Priority, RstStatus, StreamId};
