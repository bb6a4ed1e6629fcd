//! RakNet transport backed by `rust-raknet`.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_raknet::{RaknetListener, RaknetSocket, Reliability};

use crate::net::transport::{Conn, Connection, Listener, Transport};

fn raknet_err<E: std::fmt::Debug>(e: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("raknet: {:?}", e))
}

/// A RakNet session.
pub struct RakNetConnection {
    socket: RaknetSocket,
    remote: SocketAddr,
    local: SocketAddr,
}

impl std::fmt::Debug for RakNetConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RakNetConnection")
            .field("remote", &self.remote)
            .field("local", &self.local)
            .finish()
    }
}

impl RakNetConnection {
    fn new(socket: RaknetSocket) -> io::Result<Self> {
        let remote = socket.peer_addr().map_err(raknet_err)?;
        let local = socket.local_addr().map_err(raknet_err)?;
        Ok(Self {
            socket,
            remote,
            local,
        })
    }
}

#[async_trait]
impl Connection for RakNetConnection {
    async fn read_packet(&self) -> io::Result<Vec<u8>> {
        let packet = self.socket.recv().await.map_err(raknet_err)?;
        if packet.is_empty() {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
        }
        Ok(packet)
    }

    async fn write_packet(&self, packet: &[u8]) -> io::Result<()> {
        self.socket
            .send(packet, Reliability::ReliableOrdered)
            .await
            .map_err(raknet_err)
    }

    async fn close(&self) -> io::Result<()> {
        self.socket.close().await.map_err(raknet_err)
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

/// Listener half of [`RakNetTransport`].
pub struct RakNetListener {
    inner: RaknetListener,
}

#[async_trait]
impl Listener for RakNetListener {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr().map_err(raknet_err)
    }

    async fn set_status(&mut self, status: String) -> io::Result<()> {
        self.inner.set_full_motd(status).await.map_err(raknet_err)
    }

    async fn accept(&mut self) -> io::Result<Conn> {
        let socket = self.inner.accept().await.map_err(raknet_err)?;
        Ok(Arc::new(RakNetConnection::new(socket)?))
    }
}

/// RakNet over UDP sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct RakNetTransport;

#[async_trait]
impl Transport for RakNetTransport {
    async fn bind(&self, addr: &str) -> io::Result<Box<dyn Listener>> {
        let addr = resolve(addr).await?;
        let mut inner = RaknetListener::bind(&addr).await.map_err(raknet_err)?;
        inner.listen().await;
        Ok(Box::new(RakNetListener { inner }))
    }

    async fn dial(&self, addr: &str, timeout: Duration) -> io::Result<Conn> {
        let addr = resolve(addr).await?;
        let socket = tokio::time::timeout(timeout, RaknetSocket::connect(&addr))
            .await
            .map_err(|_| io::Error::from(io::ErrorKind::TimedOut))?
            .map_err(raknet_err)?;
        Ok(Arc::new(RakNetConnection::new(socket)?))
    }
}

async fn resolve(addr: &str) -> io::Result<SocketAddr> {
    tokio::net::lookup_host(addr)
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address for {}", addr)))
}
