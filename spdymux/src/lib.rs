//! # spdymux: Blocking Streams over One Shared Connection
//!
//! Many independent, bidirectional byte streams share a single duplex
//! transport. Each stream has a numeric id, its own open / half-closed /
//! reset lifecycle, opening headers, and an optional parent stream.
//!
//! ## Architecture
//!
//! - **Stream** (`stream`): per-stream state machine. Local callers write,
//!   read, reply, close and reset; the connection's inbound dispatcher
//!   delivers data, headers, acknowledgements and teardown concurrently.
//! - **Connection** (`connection`): the collaborator contract a stream calls
//!   into: stream creation, frame transmission through one serialized
//!   writer, registry lookup and removal.
//! - **Session** (`session`): a reference `Connection` with an id allocator,
//!   a stream registry and an inbound frame demultiplexer.
//!
//! ## Threading Model
//!
//! All blocking is thread-blocking. Nothing here spawns threads: a typical
//! application has one thread writing a stream, one reading it, and the
//! connection's read loop calling `Session::dispatch` for every inbound frame.
//!
//! ```rust,ignore
//! let session = Session::new(Side::Client, sink, tcp, SessionConfig::default());
//! let stream = session.open(headers, false)?;
//! stream.wait()?;
//! stream.write(b"ping")?;
//! stream.close()?;
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod connection;
pub mod error;
pub mod session;
pub mod signal;
pub mod stream;
pub mod telemetry;
pub mod transport;

pub use crate::config::{LogLevel, LoggingConfig, MuxConfig, SessionConfig};
pub use connection::{Connection, FrameSink, Framer};
pub use error::{Error, Failure, Result};
pub use session::{Session, Side};
pub use stream::{Origin, Stream, StreamState};
pub use transport::Transport;

// Re-export the protocol vocabulary for convenience
pub use spdymux_proto::{Frame, Headers, Priority, RstStatus, StreamId};
