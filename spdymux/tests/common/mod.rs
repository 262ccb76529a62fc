//! Loopback harness: two sessions wired back to back through in-process
//! frame pipes, with one pump thread per direction.

#![allow(dead_code)]

use spdymux::{Frame, Session, SessionConfig, Side, Transport};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Transport with fixed addresses and no deadlines.
pub struct PipeTransport {
    local: SocketAddr,
    peer: SocketAddr,
}

impl PipeTransport {
    fn new(local_port: u16, peer_port: u16) -> Self {
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        Self {
            local: SocketAddr::new(ip, local_port),
            peer: SocketAddr::new(ip, peer_port),
        }
    }
}

impl Transport for PipeTransport {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.peer)
    }

    fn set_read_deadline(&self, _deadline: Option<Instant>) -> io::Result<()> {
        Ok(())
    }

    fn set_write_deadline(&self, _deadline: Option<Instant>) -> io::Result<()> {
        Ok(())
    }
}

pub const CLIENT_PORT: u16 = 40000;
pub const SERVER_PORT: u16 = 443;

/// A connected client/server pair. Dropping it shuts both down.
pub struct Pair {
    pub client: Arc<Session>,
    pub server: Arc<Session>,
    pumps: Vec<JoinHandle<()>>,
}

impl Pair {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let (client_tx, client_rx) = crossbeam_channel::unbounded::<Frame>();
        let (server_tx, server_rx) = crossbeam_channel::unbounded::<Frame>();

        let client = Session::new(
            Side::Client,
            client_tx,
            PipeTransport::new(CLIENT_PORT, SERVER_PORT),
            config.clone(),
        );
        let server = Session::new(
            Side::Server,
            server_tx,
            PipeTransport::new(SERVER_PORT, CLIENT_PORT),
            config,
        );

        // Each pump ends when the sending session's framer is closed.
        let pumps = vec![
            pump(client_rx, server.clone()),
            pump(server_rx, client.clone()),
        ];

        Self {
            client,
            server,
            pumps,
        }
    }
}

impl Drop for Pair {
    fn drop(&mut self) {
        self.client.shutdown();
        self.server.shutdown();
        for pump in self.pumps.drain(..) {
            let _ = pump.join();
        }
    }
}

fn pump(rx: crossbeam_channel::Receiver<Frame>, to: Arc<Session>) -> JoinHandle<()> {
    thread::spawn(move || {
        for frame in rx.iter() {
            // Failures here are resets the peer could not write after shutdown.
            let _ = to.dispatch(frame);
        }
    })
}

/// Poll `cond` until it holds or a few seconds pass.
pub fn eventually(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}
