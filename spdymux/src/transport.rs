//! Transport capability shared by all streams of a connection.
//!
//! Streams do not implement per-stream deadlines. Address queries and
//! deadline changes are forwarded verbatim to the connection's transport,
//! so a deadline set through one stream applies to the whole connection.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

/// Address and deadline surface of the underlying duplex connection.
pub trait Transport: Send + Sync {
    /// Local socket address
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Remote socket address
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Set (or clear with `None`) both the read and write deadline.
    fn set_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.set_read_deadline(deadline)?;
        self.set_write_deadline(deadline)
    }

    /// Set (or clear with `None`) the read deadline.
    fn set_read_deadline(&self, deadline: Option<Instant>) -> io::Result<()>;

    /// Set (or clear with `None`) the write deadline.
    fn set_write_deadline(&self, deadline: Option<Instant>) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.set_read_timeout(deadline.map(timeout_until))
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.set_write_timeout(deadline.map(timeout_until))
    }
}

/// Convert an absolute deadline into a socket timeout.
///
/// Socket timeouts reject zero, so an expired deadline maps to the smallest
/// representable timeout.
fn timeout_until(deadline: Instant) -> Duration {
    deadline
        .saturating_duration_since(Instant::now())
        .max(Duration::from_nanos(1))
}
