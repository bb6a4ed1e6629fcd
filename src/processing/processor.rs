//! Connection processor.
//!
//! # Responsibilities
//! - Strip a leading PROXY header and recover the client address
//! - Capture the first game datagram verbatim
//! - Decode the Login packet and extract username and requested host
//!
//! # Design Decisions
//! - Fail closed: on any error the connection is closed and the worker
//!   moves on to the next one
//! - The inbound receiver is shared behind a mutex held only for `recv`

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinSet;

use crate::net::connection::{ProcessedConnection, RawConnection};
use crate::net::proxy_header;
use crate::observability::metrics;
use crate::protocol::{batch, packet, CodecError, Login, LoginError, LoginParser};

/// Why a handshake was rejected.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("invalid PROXY header: {0}")]
    ProxyHeader(#[source] proxy_protocol::ParseError),

    #[error("failed to read handshake: {0}")]
    Read(#[source] io::Error),

    #[error("failed to decode handshake: {0}")]
    Decode(#[source] CodecError),

    #[error("unexpected packet id {actual:#04x}, expected {expected:#04x}")]
    UnexpectedPacketId { expected: u32, actual: u32 },

    #[error("{remaining} trailing bytes after {packet} packet")]
    TrailingBytes {
        packet: &'static str,
        remaining: usize,
    },

    #[error("invalid login payload: {0}")]
    Login(#[from] LoginError),

    #[error("login carries an empty username")]
    EmptyUsername,

    #[error("login carries an empty server address")]
    EmptyHostname,
}

impl ProcessError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ProcessError::ProxyHeader(_) => "proxy_header",
            ProcessError::Read(_) => "read",
            ProcessError::Decode(_) => "decode",
            ProcessError::UnexpectedPacketId { .. } => "unexpected_packet_id",
            ProcessError::TrailingBytes { .. } => "trailing_bytes",
            ProcessError::Login(_) => "login",
            ProcessError::EmptyUsername => "empty_username",
            ProcessError::EmptyHostname => "empty_hostname",
        }
    }
}

impl From<CodecError> for ProcessError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::UnexpectedPacketId { expected, actual } => {
                ProcessError::UnexpectedPacketId { expected, actual }
            }
            CodecError::TrailingBytes { packet, remaining } => {
                ProcessError::TrailingBytes { packet, remaining }
            }
            other => ProcessError::Decode(other),
        }
    }
}

struct Handshake {
    datagram: Vec<u8>,
    username: String,
    server_host: String,
}

/// Turns raw connections into identified ones.
#[derive(Debug, Clone)]
pub struct ConnProcessor {
    parser: Arc<dyn LoginParser>,
}

impl ConnProcessor {
    pub fn new(parser: Arc<dyn LoginParser>) -> Self {
        Self { parser }
    }

    /// Start `workers` tasks draining `rx` into `tx`.
    pub fn spawn_workers(
        &self,
        workers: usize,
        rx: mpsc::UnboundedReceiver<RawConnection>,
        tx: mpsc::UnboundedSender<ProcessedConnection>,
        shutdown: &broadcast::Receiver<()>,
    ) -> JoinSet<()> {
        let rx = Arc::new(Mutex::new(rx));
        let mut set = JoinSet::new();
        for worker in 0..workers.max(1) {
            set.spawn(self.clone().run_worker(
                worker,
                Arc::clone(&rx),
                tx.clone(),
                shutdown.resubscribe(),
            ));
        }
        set
    }

    async fn run_worker(
        self,
        worker: usize,
        rx: Arc<Mutex<mpsc::UnboundedReceiver<RawConnection>>>,
        tx: mpsc::UnboundedSender<ProcessedConnection>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            let next = {
                let mut rx = rx.lock().await;
                tokio::select! {
                    raw = rx.recv() => raw,
                    _ = shutdown.recv() => None,
                }
            };
            let Some(raw) = next else {
                break;
            };

            if let Some(pc) = self.process(raw).await {
                if tx.send(pc).is_err() {
                    break;
                }
            }
        }
        tracing::debug!(worker, "Processor worker stopped");
    }

    /// Run the handshake state machine for one connection.
    ///
    /// Returns `None` after closing the connection if anything fails.
    pub async fn process(&self, mut raw: RawConnection) -> Option<ProcessedConnection> {
        match self.decode(&mut raw).await {
            Ok(hs) => {
                tracing::info!(
                    connection_id = %raw.id(),
                    remote_address = %raw.remote_addr(),
                    gateway_id = %raw.gateway_id(),
                    username = %hs.username,
                    domain = %hs.server_host,
                    "Handshake decoded"
                );
                Some(ProcessedConnection::new(
                    raw,
                    hs.datagram,
                    hs.username,
                    hs.server_host,
                ))
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %raw.id(),
                    remote_address = %raw.remote_addr(),
                    gateway_id = %raw.gateway_id(),
                    error = %e,
                    "Handshake rejected"
                );
                metrics::record_handshake_failure(e.reason());
                raw.close().await;
                None
            }
        }
    }

    async fn decode(&self, raw: &mut RawConnection) -> Result<Handshake, ProcessError> {
        let mut datagram = None;
        if raw.receive_proxy_protocol() {
            let first = read_datagram(raw).await?;
            let (source, rest) =
                proxy_header::parse(&first).map_err(ProcessError::ProxyHeader)?;
            if let Some(source) = source {
                raw.set_remote_addr(source);
            }
            if !rest.is_empty() {
                datagram = Some(rest.to_vec());
            }
        }
        let datagram = match datagram {
            Some(d) => d,
            None => read_datagram(raw).await?,
        };

        let packets = batch::decode(&datagram, raw.compression())?;
        let login: Login = packet::unmarshal(&packets[0])?;
        let identity = self.parser.parse(&login.connection_request)?;

        if identity.display_name.is_empty() {
            return Err(ProcessError::EmptyUsername);
        }
        let server_host = strip_port(&identity.server_address);
        if server_host.is_empty() {
            return Err(ProcessError::EmptyHostname);
        }
        let server_host = server_host.to_string();

        Ok(Handshake {
            datagram,
            username: identity.display_name,
            server_host,
        })
    }
}

async fn read_datagram(raw: &RawConnection) -> Result<Vec<u8>, ProcessError> {
    let datagram = raw.conn().read_packet().await.map_err(ProcessError::Read)?;
    if datagram.is_empty() {
        return Err(ProcessError::Read(io::Error::from(
            io::ErrorKind::UnexpectedEof,
        )));
    }
    Ok(datagram)
}

/// Drop a `:port` suffix from a requested address.
///
/// Bracketed IPv6 literals lose their brackets; a bare IPv6 literal is kept
/// whole since its last colon is not a port separator.
fn strip_port(addr: &str) -> &str {
    let addr = addr.trim();
    if let Some(rest) = addr.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &rest[..end],
            None => addr,
        };
    }
    match addr.rsplit_once(':') {
        Some((host, _)) if !host.contains(':') => host,
        _ => addr,
    }
}
