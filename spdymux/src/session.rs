//! # Session: Reference Connection
//!
//! Owns the stream registry for one side of a multiplexed connection,
//! allocates stream ids, writes outbound frames through a single [`Framer`]
//! and demultiplexes inbound frames onto their streams.
//!
//! The session does not read from the wire. The application's read loop
//! decodes frames and hands each one to [`Session::dispatch`].
//!
//! ## Locking
//!
//! The registry lock is never held while calling into a stream: entries are
//! cloned out, the lock released, and then the stream is driven. Stream
//! methods call back into the session (`remove_stream`, `write_frame`), so
//! holding it would deadlock.

use crate::config::SessionConfig;
use crate::connection::{Connection, FrameSink, Framer};
use crate::error::{Error, Failure, Result};
use crate::stream::{Origin, Stream};
use crate::transport::Transport;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use spdymux_proto::{
    DataFrame, Frame, Headers, HeadersFrame, Priority, RstStatus, RstStreamFrame, StreamId,
    SynReplyFrame, SynStreamFrame,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace, warn};


/// Largest stream id SPDY can carry (31 bits)
const MAX_STREAM_ID: u32 = 0x7fff_ffff;

/// Which end of the connection this session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Opens odd-numbered streams
    Client,

    /// Opens even-numbered streams
    Server,
}

impl Side {
    fn first_stream_id(self) -> u32 {
        match self {
            Side::Client => 1,
            Side::Server => 2,
        }
    }

    /// Check whether `id` belongs to streams this side opens
    pub fn owns(self, id: StreamId) -> bool {
        match self {
            Side::Client => id.is_client_initiated(),
            Side::Server => id.is_server_initiated(),
        }
    }
}

/// One side of a multiplexed connection.
pub struct Session {
    side: Side,
    me: Weak<Session>,
    config: SessionConfig,

    streams: Mutex<HashMap<StreamId, Arc<Stream>>>,
    next_id: AtomicU32,
    /// Held across id allocation and SYN_STREAM transmission so ids reach
    /// the wire in increasing order.
    open_lock: Mutex<()>,

    framer: Framer,
    transport: Box<dyn Transport>,

    accept_tx: Mutex<Option<Sender<Arc<Stream>>>>,
    accept_rx: Receiver<Arc<Stream>>,
    closed: AtomicBool,
}

impl Session {
    /// Create a session writing to `sink`.
    pub fn new(
        side: Side,
        sink: impl FrameSink + 'static,
        transport: impl Transport + 'static,
        config: SessionConfig,
    ) -> Arc<Self> {
        let (accept_tx, accept_rx) = crossbeam_channel::unbounded();

        debug!(
            ?side,
            max_concurrent_streams = config.max_concurrent_streams,
            "Session created"
        );

        Arc::new_cyclic(|me| Self {
            side,
            me: me.clone(),
            next_id: AtomicU32::new(side.first_stream_id()),
            config,
            streams: Mutex::new(HashMap::new()),
            open_lock: Mutex::new(()),
            framer: Framer::new(sink),
            transport: Box::new(transport),
            accept_tx: Mutex::new(Some(accept_tx)),
            accept_rx,
            closed: AtomicBool::new(false),
        })
    }

    /// Which side this session is
    pub fn side(&self) -> Side {
        self.side
    }

    /// Open a new stream.
    pub fn open(&self, headers: Headers, fin: bool) -> Result<Arc<Stream>> {
        self.create_stream(headers, None, fin)
    }

    /// Open a new stream and wait for the peer's reply, using the
    /// configured reply timeout.
    ///
    /// On timeout the stream is reset before the error is returned.
    pub fn open_and_wait(&self, headers: Headers, fin: bool) -> Result<Arc<Stream>> {
        let stream = self.open(headers, fin)?;
        match stream.wait_timeout(self.config.reply_timeout()) {
            Ok(()) => Ok(stream),
            Err(Error::Timeout) => {
                debug!(stream_id = %stream.id(), "No reply before timeout, resetting");
                if let Err(err) = stream.reset() {
                    warn!(stream_id = %stream.id(), %err, "Reset after timeout failed");
                }
                Err(Error::Timeout)
            }
            Err(err) => Err(err),
        }
    }

    /// Block until the peer opens a stream.
    ///
    /// Returns `None` once the session is shut down and no accepted stream
    /// is left.
    pub fn accept(&self) -> Option<Arc<Stream>> {
        self.accept_rx.recv().ok()
    }

    /// Like [`accept`](Self::accept), giving up after `timeout`.
    pub fn accept_timeout(&self, timeout: Duration) -> Option<Arc<Stream>> {
        self.accept_rx.recv_timeout(timeout).ok()
    }

    /// Number of registered streams
    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }

    /// Check whether the session has been shut down
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Tear down every stream and stop writing.
    ///
    /// Blocked readers see end-of-stream, reply waiters fail with a
    /// connection failure, and further writes fail. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.accept_tx.lock().take();
        let streams: Vec<_> = self.streams.lock().drain().map(|(_, s)| s).collect();
        for stream in &streams {
            stream.abort(Failure::Connection("session shut down".to_string()));
        }
        self.framer.close();

        debug!(side = ?self.side, aborted = streams.len(), "Session shut down");
    }

    // ------------------------------------------------------------------
    // Inbound demultiplexing
    // ------------------------------------------------------------------

    /// Route one inbound frame to its stream.
    ///
    /// Errors only come from writing a reset in response to an invalid
    /// SYN_STREAM; frames for unknown streams are dropped.
    pub fn dispatch(&self, frame: Frame) -> Result<()> {
        trace!(
            stream_id = %frame.stream_id(),
            kind = frame.kind(),
            fin = frame.is_fin(),
            "Dispatching frame"
        );

        match frame {
            Frame::SynStream(frame) => self.on_syn_stream(frame),
            Frame::SynReply(frame) => {
                self.on_syn_reply(frame);
                Ok(())
            }
            Frame::Headers(frame) => {
                self.on_headers(frame);
                Ok(())
            }
            Frame::Data(frame) => {
                self.on_data(frame);
                Ok(())
            }
            Frame::RstStream(frame) => {
                self.on_rst_stream(frame);
                Ok(())
            }
        }
    }

    fn on_syn_stream(&self, frame: SynStreamFrame) -> Result<()> {
        let id = frame.stream_id;

        if id.value() == 0 || self.side.owns(id) {
            warn!(stream_id = %id, "SYN_STREAM with invalid id parity");
            return self.reject(id, RstStatus::ProtocolError);
        }

        let stream = {
            let mut streams = self.streams.lock();

            if streams.contains_key(&id) {
                drop(streams);
                warn!(stream_id = %id, "SYN_STREAM for stream already in use");
                return self.reject(id, RstStatus::StreamInUse);
            }

            if self.is_closed() || streams.len() >= self.config.max_concurrent_streams {
                drop(streams);
                debug!(stream_id = %id, "Refusing inbound stream");
                return self.reject(id, RstStatus::RefusedStream);
            }

            let parent = frame.associated_to.filter(|p| streams.contains_key(p));
            let stream = Arc::new(Stream::new(
                id,
                Origin::Remote,
                self.me.clone(),
                frame.headers,
                parent,
                frame.priority,
            ));
            streams.insert(id, stream.clone());
            stream
        };

        debug!(
            stream_id = %id,
            parent = ?stream.parent_id(),
            priority = stream.priority().value(),
            fin = frame.fin,
            "Inbound stream opened"
        );

        if frame.fin {
            stream.close_remote();
        }

        match self.accept_tx.lock().as_ref() {
            Some(tx) => {
                if tx.send(stream).is_err() {
                    warn!(stream_id = %id, "Accept queue closed");
                }
            }
            None => debug!(stream_id = %id, "Session closing, inbound stream not queued"),
        }
        Ok(())
    }

    fn on_syn_reply(&self, frame: SynReplyFrame) {
        let Some(stream) = self.lookup(frame.stream_id, "SYN_REPLY") else {
            return;
        };
        if stream.origin() != Origin::Local {
            warn!(stream_id = %frame.stream_id, "SYN_REPLY for inbound stream dropped");
            return;
        }

        if !stream.acknowledge(Ok(())) {
            debug!(stream_id = %frame.stream_id, "Duplicate SYN_REPLY ignored");
        }
        if frame.fin {
            stream.close_remote();
        }
    }

    fn on_headers(&self, frame: HeadersFrame) {
        let Some(stream) = self.lookup(frame.stream_id, "HEADERS") else {
            return;
        };

        if !stream.deliver_headers(frame.headers) {
            warn!(stream_id = %frame.stream_id, "HEADERS after remote finish dropped");
        }
        if frame.fin {
            stream.close_remote();
        }
    }

    fn on_data(&self, frame: DataFrame) {
        let Some(stream) = self.lookup(frame.stream_id, "DATA") else {
            return;
        };

        let len = frame.data.len();
        if !stream.deliver_data(frame.data) {
            warn!(stream_id = %frame.stream_id, len, "DATA after remote finish dropped");
        }
        if frame.fin {
            stream.close_remote();
        }
    }

    fn on_rst_stream(&self, frame: RstStreamFrame) {
        let Some(stream) = self.lookup(frame.stream_id, "RST_STREAM") else {
            return;
        };
        stream.reset_remote(frame.status);
        self.remove_stream(&stream);
    }

    fn lookup(&self, id: StreamId, kind: &'static str) -> Option<Arc<Stream>> {
        let stream = self.streams.lock().get(&id).cloned();
        if stream.is_none() {
            warn!(stream_id = %id, kind, "Frame for unknown stream dropped");
        }
        stream
    }

    fn reject(&self, id: StreamId, status: RstStatus) -> Result<()> {
        self.framer.write_frame(
            RstStreamFrame {
                stream_id: id,
                status,
            }
            .into(),
        )
    }
}

impl Connection for Session {
    fn create_stream(
        &self,
        headers: Headers,
        parent: Option<&Stream>,
        fin: bool,
    ) -> Result<Arc<Stream>> {
        if self.is_closed() {
            return Err(Failure::Connection("session shut down".to_string()).into());
        }
        let priority = Priority::new(self.config.default_priority)?;

        let _open = self.open_lock.lock();
        let raw_id = self.next_id.load(Ordering::Relaxed);
        if raw_id > MAX_STREAM_ID {
            return Err(Failure::Connection("stream ids exhausted".to_string()).into());
        }
        self.next_id.store(raw_id + 2, Ordering::Relaxed);
        let id = StreamId(raw_id);

        let parent = parent.map(Stream::id);
        let stream = Arc::new(Stream::new(
            id,
            Origin::Local,
            self.me.clone(),
            headers.clone(),
            parent,
            priority,
        ));
        if fin {
            stream.mark_finished();
        }
        self.streams.lock().insert(id, stream.clone());

        let frame = SynStreamFrame {
            stream_id: id,
            associated_to: parent,
            priority,
            fin,
            headers,
        };
        if let Err(err) = self.framer.write_frame(frame.into()) {
            self.streams.lock().remove(&id);
            warn!(stream_id = %id, %err, "SYN_STREAM write failed");
            return Err(err);
        }

        debug!(stream_id = %id, parent = ?parent, fin, "Stream opened");
        Ok(stream)
    }

    fn send_headers(&self, headers: &Headers, stream: &Stream, fin: bool) -> Result<()> {
        self.framer.write_frame(
            HeadersFrame {
                stream_id: stream.id(),
                fin,
                headers: headers.clone(),
            }
            .into(),
        )
    }

    fn send_reply(&self, headers: &Headers, stream: &Stream, fin: bool) -> Result<()> {
        self.framer.write_frame(
            SynReplyFrame {
                stream_id: stream.id(),
                fin,
                headers: headers.clone(),
            }
            .into(),
        )
    }

    fn send_reset(&self, status: RstStatus, stream: &Stream) -> Result<()> {
        self.framer.write_frame(
            RstStreamFrame {
                stream_id: stream.id(),
                status,
            }
            .into(),
        )
    }

    fn remove_stream(&self, stream: &Stream) {
        if self.streams.lock().remove(&stream.id()).is_some() {
            debug!(stream_id = %stream.id(), "Stream deregistered");
        }
    }

    fn write_frame(&self, frame: Frame) -> Result<()> {
        self.framer.write_frame(frame)
    }

    fn stream(&self, id: StreamId) -> Option<Arc<Stream>> {
        self.streams.lock().get(&id).cloned()
    }

    fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("side", &self.side)
            .field("streams", &self.stream_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
