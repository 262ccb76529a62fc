//! # Connection Contract
//!
//! A stream never touches the wire itself. It calls into the connection that
//! owns it for stream creation, frame transmission and registry bookkeeping.
//!
//! ## Single Serialized Writer
//!
//! All outbound frames of one connection pass through one [`Framer`], whose
//! lock is held for the whole frame. Frames written by one stream therefore
//! reach the wire in call order, and frames of different streams never
//! interleave mid-frame.

use crate::error::{Error, Result};
use crate::stream::Stream;
use crate::transport::Transport;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use spdymux_proto::{Frame, Headers, RstStatus, StreamId};
use std::io;
use std::sync::Arc;
use tracing::trace;

/// Collaborator contract a [`Stream`] relies on.
pub trait Connection: Send + Sync {
    /// Allocate an id, register a new locally initiated stream and transmit
    /// its opening frame.
    fn create_stream(
        &self,
        headers: Headers,
        parent: Option<&Stream>,
        fin: bool,
    ) -> Result<Arc<Stream>>;

    /// Transmit a mid-stream HEADERS frame.
    fn send_headers(&self, headers: &Headers, stream: &Stream, fin: bool) -> Result<()>;

    /// Transmit a SYN_REPLY frame.
    fn send_reply(&self, headers: &Headers, stream: &Stream, fin: bool) -> Result<()>;

    /// Transmit a RST_STREAM frame.
    fn send_reset(&self, status: RstStatus, stream: &Stream) -> Result<()>;

    /// Deregister a stream. Idempotent.
    fn remove_stream(&self, stream: &Stream);

    /// Write one frame through the connection's serialized writer.
    fn write_frame(&self, frame: Frame) -> Result<()>;

    /// Look up a registered stream.
    fn stream(&self, id: StreamId) -> Option<Arc<Stream>>;

    /// Underlying transport, for address and deadline passthrough.
    fn transport(&self) -> &dyn Transport;
}

/// Destination for outbound frames (encoder + socket, or an in-process pipe).
pub trait FrameSink: Send {
    /// Write one complete frame.
    fn write_frame(&mut self, frame: Frame) -> io::Result<()>;
}

impl FrameSink for Sender<Frame> {
    fn write_frame(&mut self, frame: Frame) -> io::Result<()> {
        self.send(frame)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "frame receiver dropped"))
    }
}

/// The connection-wide serialized frame writer.
pub struct Framer {
    sink: Mutex<Option<Box<dyn FrameSink>>>,
}

impl Framer {
    /// Wrap a sink
    pub fn new(sink: impl FrameSink + 'static) -> Self {
        Self {
            sink: Mutex::new(Some(Box::new(sink))),
        }
    }

    /// Write one frame while holding the write lock.
    pub fn write_frame(&self, frame: Frame) -> Result<()> {
        let mut guard = self.sink.lock();
        let sink = guard.as_mut().ok_or_else(|| {
            Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "framer closed"))
        })?;

        trace!(
            stream_id = %frame.stream_id(),
            kind = frame.kind(),
            fin = frame.is_fin(),
            "Writing frame"
        );
        sink.write_frame(frame)?;
        Ok(())
    }

    /// Drop the sink. Later writes fail with `BrokenPipe`.
    pub fn close(&self) {
        self.sink.lock().take();
    }

    /// Check whether the sink has been dropped
    pub fn is_closed(&self) -> bool {
        self.sink.lock().is_none()
    }
}
