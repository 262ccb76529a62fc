//! # Stream State Machine
//!
//! One logical, bidirectional byte stream multiplexed over a shared
//! connection.
//!
//! ## Lifecycle
//!
//! ```text
//!   Pending --reply sent / ack received--> Open
//!   Open --local finish--> HalfClosedLocal --remote finish--> Closed
//!   Open --remote finish--> HalfClosedRemote --local finish--> Closed
//!   any --reset (either side)--> Closed
//! ```
//!
//! ## Concurrency
//!
//! Three parties touch a stream at once: a local writer, a local reader and
//! the connection's inbound dispatcher. Each correctness-critical transition
//! has its own guard:
//!
//! - **replied**: [`ReplyGate`] (lock + condvar, broadcast on resolution)
//! - **ends**: one mutex over both finish flags, so check-and-set is atomic
//!   across writers and exactly one finisher sees the other side already
//!   done. That finisher deregisters the stream.
//! - **data lock**: makes "close the inbound queues and fire the close
//!   signal" one atomic step, observed consistently by a reader about to
//!   block on those queues
//!
//! The connection's write lock is the only structure shared across streams.

use crate::connection::Connection;
use crate::error::{Error, Failure, Result};
use crate::signal::{close_signal, CloseSignal, CloseTrigger, ReplyGate};
use bytes::{Buf, Bytes};
use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::Mutex;
use spdymux_proto::{DataFrame, Headers, Priority, RstStatus, StreamId};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, trace};


/// Which side opened the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Opened by this side; acknowledged by the peer's reply.
    Local,

    /// Opened by the peer; acknowledged by our reply.
    Remote,
}

/// Observable stream state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Created, awaiting reply or acknowledgement
    Pending,

    /// Replied, neither side finished
    Open,

    /// Local side sent FIN, peer may still send
    HalfClosedLocal,

    /// Peer sent FIN, local side may still send
    HalfClosedRemote,

    /// Both sides finished, or reset
    Closed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamState::Pending => "pending",
            StreamState::Open => "open",
            StreamState::HalfClosedLocal => "half-closed (local)",
            StreamState::HalfClosedRemote => "half-closed (remote)",
            StreamState::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// Senders feeding the inbound queues, plus the close trigger.
///
/// Dropping a sender closes its queue; taking the trigger fires the close
/// signal. Both only happen under the data lock.
struct Inbound {
    data_tx: Option<Sender<Bytes>>,
    header_tx: Option<Sender<Headers>>,
    close: Option<CloseTrigger>,
}

/// Finish flags of the two directions.
#[derive(Debug, Default)]
struct Ends {
    local: bool,
    remote: bool,
}

/// A multiplexed stream.
pub struct Stream {
    id: StreamId,
    origin: Origin,
    conn: Weak<dyn Connection>,
    parent: Option<StreamId>,
    priority: AtomicU8,
    headers: Headers,

    reply: ReplyGate,
    ends: Mutex<Ends>,

    data_lock: Mutex<Inbound>,
    data_rx: Receiver<Bytes>,
    header_rx: Receiver<Headers>,
    close: CloseSignal,

    /// Set on reset: buffered inbound data is dropped, reads report EOF.
    discard: AtomicBool,

    /// Leftover bytes of the last dequeued chunk
    unread: Mutex<Bytes>,
}

impl Stream {
    /// Create a stream owned by `conn`.
    ///
    /// Called by a [`Connection`] when it opens a stream or accepts one
    /// announced by the peer. The connection keeps the registry's strong
    /// reference; the stream only holds a weak one back.
    pub fn new(
        id: StreamId,
        origin: Origin,
        conn: Weak<dyn Connection>,
        headers: Headers,
        parent: Option<StreamId>,
        priority: Priority,
    ) -> Self {
        let (data_tx, data_rx) = crossbeam_channel::unbounded();
        let (header_tx, header_rx) = crossbeam_channel::unbounded();
        let (trigger, close) = close_signal();

        Self {
            id,
            origin,
            conn,
            parent,
            priority: AtomicU8::new(priority.value()),
            headers,
            reply: ReplyGate::new(),
            ends: Mutex::new(Ends::default()),
            data_lock: Mutex::new(Inbound {
                data_tx: Some(data_tx),
                header_tx: Some(header_tx),
                close: Some(trigger),
            }),
            data_rx,
            header_rx,
            close,
            discard: AtomicBool::new(false),
            unread: Mutex::new(Bytes::new()),
        }
    }

    /// Stream id
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Which side opened the stream
    pub fn origin(&self) -> Origin {
        self.origin
    }

    fn conn(&self) -> Result<Arc<dyn Connection>> {
        self.conn.upgrade().ok_or(Error::ConnectionGone)
    }

    // ------------------------------------------------------------------
    // Reply handshake
    // ------------------------------------------------------------------

    /// Wait for the stream to be replied to, without a timeout.
    pub fn wait(&self) -> Result<()> {
        self.wait_timeout(Duration::ZERO)
    }

    /// Wait for the stream to be replied to.
    ///
    /// A zero `timeout` waits indefinitely. Returns [`Error::Timeout`] when
    /// the timeout elapses first, or [`Error::Failed`] when the
    /// acknowledgement delivered a failure.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            self.reply.wait()?;
            return Ok(());
        }
        match self.reply.wait_timeout(timeout) {
            Some(outcome) => outcome.map_err(Error::from),
            None => Err(Error::Timeout),
        }
    }

    /// Send the reply to a stream opened by the peer.
    ///
    /// No-op if already replied. With `fin` set, the local side is finished
    /// as well, and a stream whose peer already finished is deregistered.
    pub fn send_reply(&self, headers: &Headers, fin: bool) -> Result<()> {
        if self.origin == Origin::Local {
            return Err(Error::InvalidReply);
        }
        let conn = self.conn()?;

        let mut closed = false;
        let sent = self.reply.resolve_with(|| {
            conn.send_reply(headers, self, fin)?;
            if fin {
                closed = self.finish_local() == Some(true);
            }
            Ok::<_, Error>(())
        })?;
        if sent {
            debug!(stream_id = %self.id, fin, "Reply sent");
        }
        if closed {
            conn.remove_stream(self);
        }
        Ok(())
    }

    /// Refuse a stream opened by the peer before any data flows.
    ///
    /// No-op if already replied or refused. Otherwise the reply gate fails
    /// with [`Failure::Refused`], the stream is closed and deregistered, and
    /// RST_STREAM with REFUSED_STREAM is sent. Later writes fail instead of
    /// reaching the wire.
    pub fn refuse(&self) -> Result<()> {
        if self.origin == Origin::Local {
            return Err(Error::InvalidReply);
        }
        if !self.reply.resolve(Err(Failure::Refused)) {
            return Ok(());
        }

        self.finish_both();
        self.tear_down(Failure::Refused);

        let conn = self.conn()?;
        debug!(stream_id = %self.id, "Refusing stream");
        conn.remove_stream(self);
        conn.send_reset(RstStatus::RefusedStream, self)
    }

    /// Send RST_STREAM with CANCEL without touching local bookkeeping.
    ///
    /// Lets the creator of a stream abandon it at any time.
    pub fn cancel(&self) -> Result<()> {
        self.conn()?.send_reset(RstStatus::Cancel, self)
    }

    // ------------------------------------------------------------------
    // Data path
    // ------------------------------------------------------------------

    /// Write one DATA frame.
    ///
    /// Blocks until the stream is replied to. With `fin`, atomically marks
    /// the local side finished and fails with [`Error::WriteClosedStream`] if
    /// it already was; if the peer had finished too, the stream is
    /// deregistered. Each call emits exactly one frame.
    pub fn write_data(&self, data: impl Into<Bytes>, fin: bool) -> Result<()> {
        self.wait()?;

        let closed = if fin {
            self.finish_local().ok_or(Error::WriteClosedStream)?
        } else {
            false
        };

        let frame = DataFrame {
            stream_id: self.id,
            fin,
            data: data.into(),
        };
        trace!(stream_id = %self.id, len = frame.data.len(), fin, "Writing data");
        let conn = self.conn()?;
        let written = conn.write_frame(frame.into());
        if closed {
            conn.remove_stream(self);
        }
        written
    }

    /// Write `data` as one non-final DATA frame, returning the bytes accepted.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        self.write_data(Bytes::copy_from_slice(data), false)?;
        Ok(data.len())
    }

    /// Read inbound data into `buf`.
    ///
    /// A single read never returns bytes from more than one DATA frame, but
    /// one frame may be split across several reads. Blocks until data
    /// arrives; returns 0 at end-of-stream. Data that arrived before the
    /// peer finished is still returned; after a reset nothing is.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut unread = self.unread.lock();
        if self.discard.load(Ordering::SeqCst) {
            unread.clear();
            return Ok(0);
        }

        if unread.is_empty() {
            match self.next_chunk() {
                Some(chunk) => *unread = chunk,
                None => return Ok(0),
            }
        }

        let n = buf.len().min(unread.len());
        buf[..n].copy_from_slice(&unread[..n]);
        unread.advance(n);
        Ok(n)
    }

    fn next_chunk(&self) -> Option<Bytes> {
        if self.close.is_fired() {
            return self.buffered_chunk();
        }
        select! {
            recv(self.data_rx) -> chunk => match chunk {
                Ok(chunk) if !self.discard.load(Ordering::SeqCst) => Some(chunk),
                _ => None,
            },
            recv(self.close.receiver()) -> _ => self.buffered_chunk(),
        }
    }

    /// Chunk that arrived before the close signal fired, unless reset.
    fn buffered_chunk(&self) -> Option<Bytes> {
        if self.discard.load(Ordering::SeqCst) {
            return None;
        }
        self.data_rx.try_recv().ok()
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Finish the local side by sending an empty DATA frame with FIN.
    ///
    /// If the peer already finished, the stream is deregistered. A stream
    /// whose local side already finished reports
    /// [`Error::WriteClosedStream`].
    pub fn close(&self) -> Result<()> {
        self.write_data(Bytes::new(), true)
    }

    /// Reset the stream, putting it into the fully closed state.
    ///
    /// Always deregisters. If the local side had already finished this is a
    /// successful no-op; otherwise inbound queues are torn down, blocked
    /// readers and reply waiters are released, and RST_STREAM with CANCEL is
    /// sent. Safe to call any number of times from any thread.
    pub fn reset(&self) -> Result<()> {
        let conn = self.conn.upgrade();
        if let Some(conn) = &conn {
            conn.remove_stream(self);
        }

        if self.finish_local().is_none() {
            return Ok(());
        }

        let fired = self.tear_down(Failure::Reset(RstStatus::Cancel));
        debug!(stream_id = %self.id, fired, "Stream reset");

        match conn {
            Some(conn) => conn.send_reset(RstStatus::Cancel, self),
            None => Err(Error::ConnectionGone),
        }
    }

    /// Drop inbound state, fire the close signal if not yet fired, and fail
    /// a still-pending reply wait. Returns true if this call fired the signal.
    fn tear_down(&self, failure: Failure) -> bool {
        let fired = {
            let mut inbound = self.data_lock.lock();
            self.discard.store(true, Ordering::SeqCst);
            inbound.data_tx = None;
            inbound.header_tx = None;
            match inbound.close.take() {
                Some(trigger) => {
                    trigger.fire(&self.close);
                    true
                }
                None => false,
            }
        };
        self.reply.resolve(Err(failure));
        fired
    }

    // ------------------------------------------------------------------
    // Headers, hierarchy, metadata
    // ------------------------------------------------------------------

    /// Open a new stream with this one as its parent.
    pub fn create_sub_stream(&self, headers: Headers, fin: bool) -> Result<Arc<Stream>> {
        self.conn()?.create_stream(headers, Some(self), fin)
    }

    /// Send a HEADERS frame mid-stream.
    ///
    /// With `fin`, the local side is finished and [`Error::WriteClosedStream`]
    /// is returned if it already was. Finishing after the peer deregisters
    /// the stream.
    pub fn send_header(&self, headers: &Headers, fin: bool) -> Result<()> {
        let closed = if fin {
            self.finish_local().ok_or(Error::WriteClosedStream)?
        } else {
            false
        };
        let conn = self.conn()?;
        let sent = conn.send_headers(headers, self, fin);
        if closed {
            conn.remove_stream(self);
        }
        sent
    }

    /// Receive the next HEADERS frame sent by the peer.
    ///
    /// Blocks until headers arrive or the stream closes. Headers queued
    /// before the peer finished are still returned; after that (or after a
    /// reset) [`Error::StreamClosed`] is reported.
    pub fn receive_header(&self) -> Result<Headers> {
        if self.close.is_fired() {
            return self.buffered_header();
        }
        select! {
            recv(self.header_rx) -> headers => match headers {
                Ok(headers) if !self.discard.load(Ordering::SeqCst) => Ok(headers),
                Ok(_) => Err(Error::StreamClosed),
                Err(_) if self.close.is_fired() => Err(Error::StreamClosed),
                Err(_) => Err(Error::HeaderQueueClosed),
            },
            recv(self.close.receiver()) -> _ => self.buffered_header(),
        }
    }

    fn buffered_header(&self) -> Result<Headers> {
        if self.discard.load(Ordering::SeqCst) {
            return Err(Error::StreamClosed);
        }
        self.header_rx.try_recv().map_err(|_| Error::StreamClosed)
    }

    /// Set the local advisory priority. Does not change the priority
    /// already announced to the peer.
    pub fn set_priority(&self, priority: Priority) {
        self.priority.store(priority.value(), Ordering::Relaxed);
    }

    /// Local advisory priority
    pub fn priority(&self) -> Priority {
        Priority::new(self.priority.load(Ordering::Relaxed)).unwrap_or_default()
    }

    /// Headers the stream was opened with
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Id of the stream this one was spawned from
    pub fn parent_id(&self) -> Option<StreamId> {
        self.parent
    }

    /// Parent stream, resolved through the connection's registry.
    ///
    /// `None` if there is no parent or it has been deregistered.
    pub fn parent(&self) -> Option<Arc<Stream>> {
        let parent = self.parent?;
        self.conn.upgrade()?.stream(parent)
    }

    /// Whether the local side has finished sending
    pub fn is_finished(&self) -> bool {
        self.ends.lock().local
    }

    /// Whether the stream has been replied to successfully
    pub fn is_replied(&self) -> bool {
        self.reply.is_replied()
    }

    /// Current state, derived from the individual flags
    pub fn state(&self) -> StreamState {
        if self.discard.load(Ordering::SeqCst) {
            return StreamState::Closed;
        }
        let (local, remote) = {
            let ends = self.ends.lock();
            (ends.local, ends.remote)
        };
        match (local, remote) {
            (true, true) => StreamState::Closed,
            (true, false) => StreamState::HalfClosedLocal,
            (false, true) => StreamState::HalfClosedRemote,
            (false, false) if self.reply.is_resolved() => StreamState::Open,
            (false, false) => StreamState::Pending,
        }
    }

    // ------------------------------------------------------------------
    // Transport passthrough
    // ------------------------------------------------------------------

    /// Local address of the underlying transport
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.conn()?.transport().local_addr()?)
    }

    /// Remote address of the underlying transport
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.conn()?.transport().peer_addr()?)
    }

    // TODO: per-stream deadlines; these currently apply connection-wide.

    /// Set the read and write deadline of the underlying transport
    pub fn set_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        Ok(self.conn()?.transport().set_deadline(deadline)?)
    }

    /// Set the read deadline of the underlying transport
    pub fn set_read_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        Ok(self.conn()?.transport().set_read_deadline(deadline)?)
    }

    /// Set the write deadline of the underlying transport
    pub fn set_write_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        Ok(self.conn()?.transport().set_write_deadline(deadline)?)
    }

    // ------------------------------------------------------------------
    // Inbound delivery (called by the connection's dispatcher)
    // ------------------------------------------------------------------

    /// Queue an inbound data chunk.
    ///
    /// Returns false if the data queue is closed. Empty chunks are dropped
    /// so that a zero-length read always means end-of-stream.
    pub fn deliver_data(&self, data: Bytes) -> bool {
        let inbound = self.data_lock.lock();
        let Some(tx) = &inbound.data_tx else {
            return false;
        };
        if data.is_empty() {
            return true;
        }
        tx.send(data).is_ok()
    }

    /// Queue an inbound HEADERS frame. Returns false if the queue is closed.
    pub fn deliver_headers(&self, headers: Headers) -> bool {
        let inbound = self.data_lock.lock();
        match &inbound.header_tx {
            Some(tx) => tx.send(headers).is_ok(),
            None => false,
        }
    }

    /// Deliver the peer's acknowledgement of a locally opened stream.
    ///
    /// The first delivery wins and is observed by every waiter. Returns
    /// false if the stream was already resolved.
    pub fn acknowledge(&self, result: std::result::Result<(), Failure>) -> bool {
        self.reply.resolve(result)
    }

    /// The peer finished its side: close the inbound queues and fire the
    /// close signal. Already-queued data stays readable. If the local side
    /// had already finished, the stream is deregistered.
    pub fn close_remote(&self) {
        {
            let mut inbound = self.data_lock.lock();
            inbound.data_tx = None;
            inbound.header_tx = None;
            if let Some(trigger) = inbound.close.take() {
                trigger.fire(&self.close);
                debug!(stream_id = %self.id, "Remote side finished");
            }
        }

        let closed = {
            let mut ends = self.ends.lock();
            let first = !ends.remote;
            ends.remote = true;
            first && ends.local
        };
        if closed {
            if let Some(conn) = self.conn.upgrade() {
                conn.remove_stream(self);
            }
        }
    }

    /// The peer reset the stream: finish both sides, drop buffered data,
    /// release blocked readers and fail a pending reply wait.
    pub fn reset_remote(&self, status: RstStatus) {
        self.finish_both();

        let failure = match status {
            RstStatus::RefusedStream => Failure::Refused,
            other => Failure::Reset(other),
        };
        let fired = self.tear_down(failure);
        debug!(stream_id = %self.id, %status, fired, "Stream reset by peer");
    }

    /// Tear the stream down on behalf of its connection (e.g. on shutdown).
    pub fn abort(&self, failure: Failure) {
        self.finish_both();
        self.tear_down(failure);
    }

    /// Mark the local side finished without sending anything, for a
    /// connection whose opening frame already carried FIN.
    ///
    /// Returns true if this call performed the transition. Deregisters the
    /// stream if the peer had already finished.
    pub fn mark_finished(&self) -> bool {
        match self.finish_local() {
            Some(closed) => {
                if closed {
                    if let Some(conn) = self.conn.upgrade() {
                        conn.remove_stream(self);
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Finish the local side. `None` if it already was, otherwise whether
    /// the remote side had finished first.
    fn finish_local(&self) -> Option<bool> {
        let mut ends = self.ends.lock();
        if ends.local {
            return None;
        }
        ends.local = true;
        Some(ends.remote)
    }

    fn finish_both(&self) {
        let mut ends = self.ends.lock();
        ends.local = true;
        ends.remote = true;
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream:{}", self.id)
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("parent", &self.parent)
            .field("state", &self.state())
            .finish()
    }
}

impl io::Read for &Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Stream::read(*self, buf).map_err(io::Error::from)
    }
}

impl io::Write for &Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Stream::write(*self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
