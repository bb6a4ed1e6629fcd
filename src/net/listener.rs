//! Gateways: bound listeners feeding the pipeline.
//!
//! # Responsibilities
//! - Bind every configured listener, failing startup if one cannot bind
//! - Register the discovery ping status per listener
//! - Run one accept loop per listener and wrap accepted sessions with
//!   their provenance
//!
//! # Design Decisions
//! - Accept loops are independent: one listener closing ends only its loop
//! - `serve` returns once every accept loop has exited

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

use crate::net::connection::RawConnection;
use crate::net::transport::{Listener, Transport};
use crate::observability::metrics;
use crate::protocol::Compression;

/// Error type for gateway startup.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway {gateway_id}: failed to bind {bind}: {source}")]
    Bind {
        gateway_id: String,
        bind: String,
        #[source]
        source: io::Error,
    },

    #[error("gateway {gateway_id}: failed to set ping status on {bind}: {source}")]
    Status {
        gateway_id: String,
        bind: String,
        #[source]
        source: io::Error,
    },
}

/// Fields answered to unconnected discovery pings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingStatus {
    pub edition: String,
    /// Up to two lines separated by `\n`.
    pub motd: String,
    pub protocol_version: i32,
    pub version_name: String,
    pub player_count: u32,
    pub max_player_count: u32,
    pub game_mode: String,
    pub game_mode_numeric: u32,
}

impl PingStatus {
    /// Render the semicolon-terminated status string for a listener.
    pub fn render(&self, server_guid: u64, port: u16) -> String {
        let mut lines = self.motd.splitn(2, '\n');
        let motd1 = lines.next().unwrap_or_default();
        let motd2 = lines.next().unwrap_or_default();

        format!(
            "{};{};{};{};{};{};{};{};{};{};{};{};",
            self.edition,
            motd1,
            self.protocol_version,
            self.version_name,
            self.player_count,
            self.max_player_count,
            server_guid,
            motd2,
            self.game_mode,
            self.game_mode_numeric,
            port,
            port,
        )
    }
}

/// One endpoint of a gateway.
#[derive(Debug, Clone)]
pub struct ListenerDescriptor {
    pub bind: String,
    pub ping_status: PingStatus,
}

/// Immutable description of a gateway.
#[derive(Debug, Clone)]
pub struct GatewayDescriptor {
    pub id: String,
    pub listeners: Vec<ListenerDescriptor>,
    /// Servers this gateway may route to.
    pub server_ids: Vec<String>,
    pub receive_proxy_protocol: bool,
    pub compression: Compression,
    /// Template sent when no server answers the requested domain.
    pub not_found_message: String,
}

/// A gateway ready to bind.
pub struct Gateway {
    descriptor: GatewayDescriptor,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("id", &self.descriptor.id)
            .finish()
    }
}

impl Gateway {
    pub fn new(descriptor: GatewayDescriptor, transport: Arc<dyn Transport>) -> Self {
        Self {
            descriptor,
            transport,
        }
    }

    pub fn descriptor(&self) -> &GatewayDescriptor {
        &self.descriptor
    }

    /// Bind every listener and serve until all of them have stopped.
    pub async fn start(
        &self,
        tx: mpsc::UnboundedSender<RawConnection>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), GatewayError> {
        let bound = self.bind().await?;
        bound.serve(tx, shutdown).await;
        Ok(())
    }

    /// Bind every listener and register its ping status.
    pub async fn bind(&self) -> Result<BoundGateway, GatewayError> {
        let mut listeners = Vec::with_capacity(self.descriptor.listeners.len());
        for ld in &self.descriptor.listeners {
            let mut listener =
                self.transport
                    .bind(&ld.bind)
                    .await
                    .map_err(|source| GatewayError::Bind {
                        gateway_id: self.descriptor.id.clone(),
                        bind: ld.bind.clone(),
                        source,
                    })?;
            let local_addr = listener.local_addr().map_err(|source| GatewayError::Bind {
                gateway_id: self.descriptor.id.clone(),
                bind: ld.bind.clone(),
                source,
            })?;

            let status = ld.ping_status.render(rand::random(), local_addr.port());
            listener
                .set_status(status)
                .await
                .map_err(|source| GatewayError::Status {
                    gateway_id: self.descriptor.id.clone(),
                    bind: ld.bind.clone(),
                    source,
                })?;

            tracing::info!(
                gateway_id = %self.descriptor.id,
                address = %local_addr,
                "Listener bound"
            );
            listeners.push((local_addr, listener));
        }

        Ok(BoundGateway {
            id: Arc::from(self.descriptor.id.as_str()),
            server_ids: Arc::from(self.descriptor.server_ids.clone()),
            receive_proxy_protocol: self.descriptor.receive_proxy_protocol,
            compression: self.descriptor.compression,
            listeners,
        })
    }
}

/// A gateway whose listeners are bound.
pub struct BoundGateway {
    id: Arc<str>,
    server_ids: Arc<[String]>,
    receive_proxy_protocol: bool,
    compression: Compression,
    listeners: Vec<(SocketAddr, Box<dyn Listener>)>,
}

impl fmt::Debug for BoundGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundGateway")
            .field("id", &self.id)
            .field("local_addrs", &self.local_addrs())
            .finish()
    }
}

impl BoundGateway {
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().map(|(addr, _)| *addr).collect()
    }

    /// Run one accept loop per listener; returns once all have exited.
    pub async fn serve(
        self,
        tx: mpsc::UnboundedSender<RawConnection>,
        shutdown: broadcast::Receiver<()>,
    ) {
        let mut loops = JoinSet::new();
        for (addr, listener) in self.listeners {
            loops.spawn(accept_loop(
                addr,
                listener,
                AcceptContext {
                    gateway_id: Arc::clone(&self.id),
                    server_ids: Arc::clone(&self.server_ids),
                    receive_proxy_protocol: self.receive_proxy_protocol,
                    compression: self.compression,
                },
                tx.clone(),
                shutdown.resubscribe(),
            ));
        }

        while let Some(res) = loops.join_next().await {
            if let Err(e) = res {
                tracing::error!(gateway_id = %self.id, error = %e, "Accept loop panicked");
            }
        }
        tracing::info!(gateway_id = %self.id, "Gateway stopped");
    }
}

struct AcceptContext {
    gateway_id: Arc<str>,
    server_ids: Arc<[String]>,
    receive_proxy_protocol: bool,
    compression: Compression,
}

async fn accept_loop(
    addr: SocketAddr,
    mut listener: Box<dyn Listener>,
    ctx: AcceptContext,
    tx: mpsc::UnboundedSender<RawConnection>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let conn = tokio::select! {
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::info!(gateway_id = %ctx.gateway_id, address = %addr, error = %e, "Listener closed");
                    break;
                }
            },
            _ = shutdown.recv() => {
                tracing::debug!(gateway_id = %ctx.gateway_id, address = %addr, "Accept loop received shutdown signal");
                break;
            }
        };

        tracing::debug!(
            gateway_id = %ctx.gateway_id,
            remote_address = %conn.remote_addr(),
            "Connected"
        );
        metrics::record_connection_accepted(&ctx.gateway_id);

        let raw = RawConnection::new(
            conn,
            Arc::clone(&ctx.gateway_id),
            Arc::clone(&ctx.server_ids),
            ctx.receive_proxy_protocol,
            ctx.compression,
        );
        if tx.send(raw).is_err() {
            tracing::debug!(gateway_id = %ctx.gateway_id, "Pipeline closed, stopping accept loop");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use crate::net::memory::MemoryTransport;
    use std::time::Duration;

    fn status() -> PingStatus {
        PingStatus {
            edition: "MCPE".into(),
            motd: "Line one\nLine two".into(),
            protocol_version: 527,
            version_name: "1.19.1".into(),
            player_count: 3,
            max_player_count: 20,
            game_mode: "Survival".into(),
            game_mode_numeric: 1,
        }
    }

    fn descriptor(binds: &[&str]) -> GatewayDescriptor {
        GatewayDescriptor {
            id: "default".into(),
            listeners: binds
                .iter()
                .map(|b| ListenerDescriptor {
                    bind: b.to_string(),
                    ping_status: status(),
                })
                .collect(),
            server_ids: vec!["lobby".into()],
            receive_proxy_protocol: false,
            compression: Compression::Flate,
            not_found_message: String::new(),
        }
    }

    #[test]
    fn ping_status_field_order() {
        assert_eq!(
            status().render(42, 19132),
            "MCPE;Line one;527;1.19.1;3;20;42;Line two;Survival;1;19132;19132;"
        );
    }

    #[test]
    fn ping_status_single_line_motd() {
        let mut s = status();
        s.motd = "Only".into();
        assert!(s.render(1, 1).starts_with("MCPE;Only;527;"));
        assert!(s.render(1, 1).contains(";1;;Survival;"));
    }

    #[tokio::test]
    async fn bind_failure_aborts_start() {
        let transport = MemoryTransport::new();
        let _taken = transport.bind("127.0.0.1:19132").await.unwrap();

        let gw = Gateway::new(
            descriptor(&["127.0.0.1:19133", "127.0.0.1:19132"]),
            Arc::new(transport),
        );
        let err = gw.bind().await.unwrap_err();
        assert!(matches!(err, GatewayError::Bind { ref bind, .. } if bind == "127.0.0.1:19132"));
    }

    #[tokio::test]
    async fn accepted_connections_carry_provenance() {
        let transport = MemoryTransport::new();
        let gw = Gateway::new(descriptor(&["127.0.0.1:19132"]), Arc::new(transport.clone()));
        let bound = gw.bind().await.unwrap();
        let addr = bound.local_addrs()[0];
        assert!(transport.status(addr).unwrap().starts_with("MCPE;Line one;"));

        let shutdown = Shutdown::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let serve = tokio::spawn(bound.serve(tx, shutdown.subscribe()));

        let client = transport.connect(addr).unwrap();
        let raw = rx.recv().await.unwrap();
        assert_eq!(raw.gateway_id(), "default");
        assert_eq!(raw.server_ids(), ["lobby".to_string()]);
        assert_eq!(raw.remote_addr(), crate::net::Connection::local_addr(&*client));

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), serve)
            .await
            .expect("serve should return after shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn start_binds_and_serves_until_shutdown() {
        let transport = MemoryTransport::new();
        let gw = Gateway::new(descriptor(&["127.0.0.1:19140"]), Arc::new(transport.clone()));
        let shutdown = Shutdown::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let rx_shutdown = shutdown.subscribe();
        let serve = tokio::spawn(async move { gw.start(tx, rx_shutdown).await });

        let addr: SocketAddr = "127.0.0.1:19140".parse().unwrap();
        let client = loop {
            match transport.connect(addr) {
                Ok(client) => break client,
                Err(_) => tokio::task::yield_now().await,
            }
        };
        let raw = rx.recv().await.unwrap();
        assert_eq!(raw.remote_addr(), crate::net::Connection::local_addr(&*client));

        shutdown.trigger();
        let res = tokio::time::timeout(Duration::from_secs(1), serve)
            .await
            .expect("start should return after shutdown")
            .unwrap();
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn one_listener_closing_leaves_others_running() {
        let transport = MemoryTransport::new();
        let gw = Gateway::new(
            descriptor(&["127.0.0.1:19132", "127.0.0.1:19133"]),
            Arc::new(transport.clone()),
        );
        let bound = gw.bind().await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let shutdown = Shutdown::new();
        let serve = tokio::spawn(bound.serve(tx, shutdown.subscribe()));

        transport.unbind("127.0.0.1:19132".parse().unwrap());
        tokio::task::yield_now().await;

        let _client = transport.connect("127.0.0.1:19133".parse().unwrap()).unwrap();
        assert!(rx.recv().await.is_some());
        assert!(!serve.is_finished());

        transport.unbind("127.0.0.1:19133".parse().unwrap());
        tokio::time::timeout(Duration::from_secs(1), serve)
            .await
            .expect("serve should return once every listener closed")
            .unwrap();
    }
}
