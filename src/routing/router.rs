//! Server routing.
//!
//! # Responsibilities
//! - Resolve a processed connection to its backend server
//! - Dial the backend and replay the captured handshake
//! - Answer misses and offline backends with a templated disconnect
//!
//! # Design Decisions
//! - The lookup runs on the dispatcher; dialing runs on a task per
//!   connection so one slow backend never delays other players
//! - Misses and offline backends are expected outcomes, logged at info

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::hooks::{HookDispatcher, Player};
use crate::net::connection::ProcessedConnection;
use crate::net::listener::GatewayDescriptor;
use crate::net::proxy_header;
use crate::net::transport::{Conn, Transport};
use crate::observability::metrics;
use crate::routing::index::{RoutingIndex, ServerDescriptor};
use crate::routing::template::{render, TemplateVars};
use crate::tunnel::Tunnel;

/// Sent when a gateway has no message of its own.
pub const DEFAULT_NOT_FOUND_MESSAGE: &str = "Server not found: {{domain}}";

/// Outcome of the index lookup.
#[derive(Debug, Clone)]
pub enum Resolution {
    Found(Arc<ServerDescriptor>),
    NotFound,
    /// Indexed, but not permitted for the accepting gateway.
    Forbidden(Arc<ServerDescriptor>),
}

/// Pairs processed connections with backend sessions.
pub struct ServerRouter {
    index: Arc<RoutingIndex>,
    /// Gateway id to not-found template.
    not_found: HashMap<String, String>,
    transport: Arc<dyn Transport>,
    hooks: Arc<HookDispatcher>,
}

impl std::fmt::Debug for ServerRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRouter")
            .field("routes", &self.index.len())
            .finish()
    }
}

impl ServerRouter {
    pub fn new(
        index: Arc<RoutingIndex>,
        gateways: &[GatewayDescriptor],
        transport: Arc<dyn Transport>,
        hooks: Arc<HookDispatcher>,
    ) -> Self {
        let not_found = gateways
            .iter()
            .map(|g| (g.id.clone(), g.not_found_message.clone()))
            .collect();
        Self {
            index,
            not_found,
            transport,
            hooks,
        }
    }

    /// Dispatch connections from `rx`, sending established tunnels to `tx`.
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<ProcessedConnection>,
        tx: mpsc::UnboundedSender<Tunnel>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            let pc = tokio::select! {
                pc = rx.recv() => match pc {
                    Some(pc) => pc,
                    None => break,
                },
                _ = shutdown.recv() => {
                    tracing::debug!("Router received shutdown signal");
                    break;
                }
            };

            let resolution = self.resolve(&pc);
            let router = Arc::clone(&self);
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(tunnel) = router.complete(pc, resolution).await {
                    if let Err(mpsc::error::SendError(tunnel)) = tx.send(tunnel) {
                        let _ = tunnel.client.close().await;
                        let _ = tunnel.backend.close().await;
                    }
                }
            });
        }
    }

    /// Look up the server for a connection and check the gateway permits it.
    pub fn resolve(&self, pc: &ProcessedConnection) -> Resolution {
        let raw = pc.raw();
        match self.index.lookup(raw.gateway_id(), pc.server_host()) {
            None => Resolution::NotFound,
            Some(server) if !raw.server_ids().iter().any(|id| *id == server.id) => {
                Resolution::Forbidden(Arc::clone(server))
            }
            Some(server) => Resolution::Found(Arc::clone(server)),
        }
    }

    /// Resolve and connect one connection.
    pub async fn route(&self, pc: ProcessedConnection) -> Option<Tunnel> {
        let resolution = self.resolve(&pc);
        self.complete(pc, resolution).await
    }

    async fn complete(&self, pc: ProcessedConnection, resolution: Resolution) -> Option<Tunnel> {
        match resolution {
            Resolution::Found(server) => self.connect(pc, &server).await,
            Resolution::NotFound => {
                tracing::info!(
                    connection_id = %pc.raw().id(),
                    remote_address = %pc.raw().remote_addr(),
                    gateway_id = %pc.raw().gateway_id(),
                    domain = %pc.server_host(),
                    "No server for domain"
                );
                metrics::record_route("not_found");
                self.reject_not_found(pc).await;
                None
            }
            Resolution::Forbidden(server) => {
                tracing::warn!(
                    connection_id = %pc.raw().id(),
                    remote_address = %pc.raw().remote_addr(),
                    gateway_id = %pc.raw().gateway_id(),
                    server_id = %server.id,
                    "Server not permitted on gateway"
                );
                metrics::record_route("forbidden");
                self.reject_not_found(pc).await;
                None
            }
        }
    }

    async fn reject_not_found(&self, pc: ProcessedConnection) {
        let template = self
            .not_found
            .get(pc.raw().gateway_id())
            .map(String::as_str)
            .unwrap_or(DEFAULT_NOT_FOUND_MESSAGE);
        let message = render(template, &TemplateVars::from_connection(&pc, None));
        disconnect(pc, &message).await;
    }

    async fn connect(&self, pc: ProcessedConnection, server: &ServerDescriptor) -> Option<Tunnel> {
        let raw = pc.raw();
        tracing::info!(
            connection_id = %raw.id(),
            remote_address = %raw.remote_addr(),
            username = %pc.username(),
            server_id = %server.id,
            "Connecting client"
        );

        let backend = match self
            .transport
            .dial(&server.address, server.dial_timeout)
            .await
        {
            Ok(backend) => backend,
            Err(e) => {
                tracing::info!(
                    connection_id = %raw.id(),
                    remote_address = %raw.remote_addr(),
                    server_id = %server.id,
                    address = %server.address,
                    error = %e,
                    "Server offline"
                );
                metrics::record_route("offline");
                let vars = TemplateVars::from_connection(&pc, Some(server.address.as_str()));
                let message = render(&server.disconnect_message, &vars);
                disconnect(pc, &message).await;
                return None;
            }
        };

        if let Err(e) = replay(&pc, server, &backend).await {
            tracing::warn!(
                connection_id = %raw.id(),
                server_id = %server.id,
                error = %e,
                "Failed to replay handshake to server"
            );
            let _ = backend.close().await;
            pc.raw().close().await;
            return None;
        }

        let player = Player {
            username: pc.username().to_string(),
            remote_address: raw.remote_addr(),
            local_address: raw.local_addr(),
            gateway_id: raw.gateway_id().to_string(),
            server_id: server.id.clone(),
            domain: pc.server_host().to_string(),
            server_address: server.address.clone(),
        };
        self.hooks.player_join(&player);
        metrics::record_route("tunnel");

        let id = raw.id();
        let client = pc.into_raw().into_conn();
        Some(Tunnel::new(id, client, backend).with_player(player))
    }
}

async fn replay(
    pc: &ProcessedConnection,
    server: &ServerDescriptor,
    backend: &Conn,
) -> std::io::Result<()> {
    if server.send_proxy_protocol {
        let header = proxy_header::encode_v2(pc.raw().remote_addr(), pc.raw().local_addr());
        backend.write_packet(&header).await?;
    }
    backend.write_packet(pc.handshake()).await
}

async fn disconnect(pc: ProcessedConnection, message: &str) {
    let raw = pc.into_raw();
    if let Err(e) = raw.disconnect(message).await {
        tracing::debug!(
            connection_id = %raw.id(),
            remote_address = %raw.remote_addr(),
            error = %e,
            "Failed to send disconnect"
        );
    }
    raw.close().await;
}
