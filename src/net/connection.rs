//! Connection values handed between pipeline stages.
//!
//! # Responsibilities
//! - Tag every session with an id for log correlation
//! - Carry provenance (gateway, permitted servers, remote address) from
//!   accept to routing
//! - Hold the captured handshake once it has been decoded
//! - Count live tunnels
//!
//! # Design Decisions
//! - Each value is owned by exactly one stage; channel hand-off moves it
//! - A `ProcessedConnection` only exists for a fully identified client

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::net::transport::Conn;
use crate::observability::metrics;
use crate::protocol::{batch, packet, Compression, Disconnect};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id attached to every log line of one client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A freshly accepted client session plus where it came from.
#[derive(Debug)]
pub struct RawConnection {
    id: ConnectionId,
    conn: Conn,
    /// Overwritten when a PROXY header reveals the real client.
    remote_addr: SocketAddr,
    gateway_id: Arc<str>,
    server_ids: Arc<[String]>,
    receive_proxy_protocol: bool,
    compression: Compression,
}

impl RawConnection {
    pub fn new(
        conn: Conn,
        gateway_id: Arc<str>,
        server_ids: Arc<[String]>,
        receive_proxy_protocol: bool,
        compression: Compression,
    ) -> Self {
        let remote_addr = conn.remote_addr();
        Self {
            id: ConnectionId::next(),
            conn,
            remote_addr,
            gateway_id,
            server_ids,
            receive_proxy_protocol,
            compression,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn conn(&self) -> &Conn {
        &self.conn
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn set_remote_addr(&mut self, addr: SocketAddr) {
        self.remote_addr = addr;
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.conn.local_addr()
    }

    pub fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    /// Servers the accepting gateway may route to.
    pub fn server_ids(&self) -> &[String] {
        &self.server_ids
    }

    pub fn receive_proxy_protocol(&self) -> bool {
        self.receive_proxy_protocol
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Send a disconnect packet carrying `message`.
    pub async fn disconnect(&self, message: &str) -> io::Result<()> {
        let pk = packet::marshal(&Disconnect::with_message(message));
        let datagram = batch::encode(&[pk], self.compression)?;
        self.conn.write_packet(&datagram).await
    }

    /// Close the session, logging rather than returning failures.
    pub async fn close(&self) {
        if let Err(e) = self.conn.close().await {
            tracing::debug!(
                connection_id = %self.id,
                remote_address = %self.remote_addr,
                error = %e,
                "Close failed"
            );
        }
    }

    /// Give up the provenance and keep the bare session.
    pub fn into_conn(self) -> Conn {
        self.conn
    }
}

/// A client whose handshake has been decoded and identified.
///
/// Never constructed on decode failure; username and host are non-empty.
#[derive(Debug)]
pub struct ProcessedConnection {
    raw: RawConnection,
    handshake: Vec<u8>,
    username: String,
    server_host: String,
}

impl ProcessedConnection {
    pub(crate) fn new(
        raw: RawConnection,
        handshake: Vec<u8>,
        username: String,
        server_host: String,
    ) -> Self {
        debug_assert!(!username.is_empty() && !server_host.is_empty());
        Self {
            raw,
            handshake,
            username,
            server_host,
        }
    }

    pub fn raw(&self) -> &RawConnection {
        &self.raw
    }

    /// The exact datagram the client sent first.
    pub fn handshake(&self) -> &[u8] {
        &self.handshake
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Requested hostname with any port stripped.
    pub fn server_host(&self) -> &str {
        &self.server_host
    }

    pub fn into_raw(self) -> RawConnection {
        self.raw
    }
}

/// Live tunnel count, shared by the pool and whoever reports on it.
#[derive(Debug, Clone, Default)]
pub struct TunnelTracker {
    live: Arc<AtomicU64>,
}

impl TunnelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a tunnel as live until the returned guard drops.
    pub fn open(&self) -> TunnelGuard {
        self.live.fetch_add(1, Ordering::SeqCst);
        metrics::tunnel_opened();
        TunnelGuard {
            live: Arc::clone(&self.live),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.live.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct TunnelGuard {
    live: Arc<AtomicU64>,
}

impl Drop for TunnelGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        metrics::tunnel_closed();
    }
}
