//! Transport abstraction.
//!
//! The reliable-UDP session layer is not implemented here. Anything that can
//! bind a listener, accept sessions and dial out can carry the proxy.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// A live session with one peer.
///
/// All methods take `&self` so the two relay directions of a tunnel can
/// share one connection. `close` must unblock a pending `read_packet`.
#[async_trait]
pub trait Connection: Send + Sync + std::fmt::Debug {
    /// Read exactly one datagram.
    async fn read_packet(&self) -> io::Result<Vec<u8>>;

    /// Write one datagram.
    async fn write_packet(&self, packet: &[u8]) -> io::Result<()>;

    /// Close the session. Closing twice is not an error.
    async fn close(&self) -> io::Result<()>;

    fn remote_addr(&self) -> SocketAddr;

    fn local_addr(&self) -> SocketAddr;
}

/// Shared handle to a connection.
pub type Conn = Arc<dyn Connection>;

/// A bound endpoint accepting sessions.
#[async_trait]
pub trait Listener: Send + Sync {
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Set the string answered to unconnected discovery pings.
    async fn set_status(&mut self, status: String) -> io::Result<()>;

    /// Wait for the next session. An error means the listener is gone.
    async fn accept(&mut self) -> io::Result<Conn>;
}

/// Binds listeners and dials backends.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn bind(&self, addr: &str) -> io::Result<Box<dyn Listener>>;

    async fn dial(&self, addr: &str, timeout: Duration) -> io::Result<Conn>;
}
