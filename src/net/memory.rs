//! In-process transport.
//!
//! Connections are pairs of channels sharing one close flag, so closing
//! either end wakes a pending read on both. Used by the test suites and for
//! running the pipeline without sockets.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::net::transport::{Conn, Connection, Listener, Transport};

const FIRST_EPHEMERAL_PORT: u16 = 40_000;

/// One end of an in-process session.
#[derive(Debug)]
pub struct MemoryConnection {
    local: SocketAddr,
    remote: SocketAddr,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: Arc<watch::Sender<bool>>,
}

impl MemoryConnection {
    /// Create a connected pair: `(a, b)` where `a` is bound to `a_addr`.
    pub fn pair(a_addr: SocketAddr, b_addr: SocketAddr) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        let closed = Arc::new(closed);

        let a = Self {
            local: a_addr,
            remote: b_addr,
            tx: a_tx,
            rx: tokio::sync::Mutex::new(a_rx),
            closed: Arc::clone(&closed),
        };
        let b = Self {
            local: b_addr,
            remote: a_addr,
            tx: b_tx,
            rx: tokio::sync::Mutex::new(b_rx),
            closed,
        };
        (a, b)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn read_packet(&self) -> io::Result<Vec<u8>> {
        let mut closed = self.closed.subscribe();
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            packet = rx.recv() => {
                packet.ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
            }
            _ = closed.wait_for(|closed| *closed) => {
                Err(io::Error::new(io::ErrorKind::ConnectionAborted, "connection closed"))
            }
        }
    }

    async fn write_packet(&self, packet: &[u8]) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.tx
            .send(packet.to_vec())
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }

    async fn close(&self) -> io::Result<()> {
        self.closed.send_replace(true);
        Ok(())
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

#[derive(Debug)]
struct Endpoint {
    accept_tx: mpsc::UnboundedSender<Conn>,
    status: Arc<Mutex<String>>,
}

#[derive(Debug, Default)]
struct Network {
    endpoints: Mutex<HashMap<SocketAddr, Endpoint>>,
    next_port: AtomicU16,
}

impl Network {
    fn ephemeral_addr(&self) -> SocketAddr {
        let offset = self.next_port.fetch_add(1, Ordering::Relaxed);
        SocketAddr::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            FIRST_EPHEMERAL_PORT.wrapping_add(offset),
        )
    }

    fn endpoints(&self) -> std::sync::MutexGuard<'_, HashMap<SocketAddr, Endpoint>> {
        self.endpoints.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Transport whose listeners and dialers live in the same process.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    network: Arc<Network>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The discovery status registered for a bound address.
    pub fn status(&self, addr: SocketAddr) -> Option<String> {
        self.network.endpoints().get(&addr).map(|ep| {
            ep.status
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        })
    }

    /// Unbind `addr`, ending the accept loop of its listener.
    pub fn unbind(&self, addr: SocketAddr) -> bool {
        self.network.endpoints().remove(&addr).is_some()
    }

    /// Open a session to `addr`, returning the concrete client end.
    pub fn connect(&self, addr: SocketAddr) -> io::Result<Arc<MemoryConnection>> {
        let endpoints = self.network.endpoints();
        let endpoint = endpoints
            .get(&addr)
            .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))?;

        let (client, server) = MemoryConnection::pair(self.network.ephemeral_addr(), addr);
        endpoint
            .accept_tx
            .send(Arc::new(server))
            .map_err(|_| io::Error::from(io::ErrorKind::ConnectionRefused))?;
        Ok(Arc::new(client))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn bind(&self, addr: &str) -> io::Result<Box<dyn Listener>> {
        let mut addr: SocketAddr = addr
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        if addr.port() == 0 {
            addr = self.network.ephemeral_addr();
        }

        let mut endpoints = self.network.endpoints();
        if endpoints.contains_key(&addr) {
            return Err(io::Error::from(io::ErrorKind::AddrInUse));
        }

        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let status = Arc::new(Mutex::new(String::new()));
        endpoints.insert(
            addr,
            Endpoint {
                accept_tx,
                status: Arc::clone(&status),
            },
        );

        Ok(Box::new(MemoryListener {
            addr,
            accept_rx,
            status,
            network: Arc::clone(&self.network),
        }))
    }

    async fn dial(&self, addr: &str, _timeout: Duration) -> io::Result<Conn> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let conn: Conn = self.connect(addr)?;
        Ok(conn)
    }
}

/// Listener half of [`MemoryTransport`].
#[derive(Debug)]
pub struct MemoryListener {
    addr: SocketAddr,
    accept_rx: mpsc::UnboundedReceiver<Conn>,
    status: Arc<Mutex<String>>,
    network: Arc<Network>,
}

#[async_trait]
impl Listener for MemoryListener {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }

    async fn set_status(&mut self, status: String) -> io::Result<()> {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
        Ok(())
    }

    async fn accept(&mut self) -> io::Result<Conn> {
        self.accept_rx
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "listener closed"))
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        let mut endpoints = self.network.endpoints();
        let ours = endpoints
            .get(&self.addr)
            .map(|ep| Arc::ptr_eq(&ep.status, &self.status))
            .unwrap_or(false);
        if ours {
            endpoints.remove(&self.addr);
        }
    }
}
