//! Tunnel pool.
//!
//! # Responsibilities
//! - Spawn one relay per tunnel with a copy loop per direction
//! - Close both legs as soon as either direction ends
//! - Track live tunnels and fire the leave hook on teardown

use std::io;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::hooks::{HookDispatcher, Player};
use crate::net::connection::{ConnectionId, TunnelTracker};
use crate::net::transport::Conn;

/// A client session paired with its backend session.
#[derive(Debug)]
pub struct Tunnel {
    pub id: ConnectionId,
    pub client: Conn,
    pub backend: Conn,
    /// Set when the tunnel belongs to an identified player.
    pub player: Option<Player>,
}

impl Tunnel {
    pub fn new(id: ConnectionId, client: Conn, backend: Conn) -> Self {
        Self {
            id,
            client,
            backend,
            player: None,
        }
    }

    pub fn with_player(mut self, player: Player) -> Self {
        self.player = Some(player);
        self
    }
}

/// Drives tunnels until one of their legs closes.
#[derive(Debug, Clone)]
pub struct TunnelPool {
    tracker: TunnelTracker,
    hooks: Arc<HookDispatcher>,
}

impl TunnelPool {
    pub fn new(tracker: TunnelTracker, hooks: Arc<HookDispatcher>) -> Self {
        Self { tracker, hooks }
    }

    pub fn tracker(&self) -> &TunnelTracker {
        &self.tracker
    }

    /// Relay every tunnel received on `rx` until the channel closes or
    /// shutdown fires. Running relays are not interrupted.
    pub async fn run(
        &self,
        mut rx: mpsc::UnboundedReceiver<Tunnel>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                tunnel = rx.recv() => match tunnel {
                    Some(tunnel) => {
                        tokio::spawn(self.clone().relay(tunnel));
                    }
                    None => break,
                },
                _ = shutdown.recv() => {
                    tracing::debug!("Tunnel pool received shutdown signal");
                    break;
                }
            }
        }
    }

    /// Copy packets both ways until either direction ends, then close both.
    pub async fn relay(self, tunnel: Tunnel) {
        let _guard = self.tracker.open();
        let Tunnel {
            id,
            client,
            backend,
            player,
        } = tunnel;

        tracing::debug!(
            connection_id = %id,
            client = %client.remote_addr(),
            backend = %backend.remote_addr(),
            "Tunnel opened"
        );

        let mut upstream = tokio::spawn(copy_packets(Arc::clone(&client), Arc::clone(&backend)));
        let mut downstream = tokio::spawn(copy_packets(Arc::clone(&backend), Arc::clone(&client)));

        let (first, upstream_done) = tokio::select! {
            res = &mut upstream => (res, true),
            res = &mut downstream => (res, false),
        };

        for leg in [&client, &backend] {
            if let Err(e) = leg.close().await {
                tracing::debug!(connection_id = %id, error = %e, "Close failed");
            }
        }

        let second = if upstream_done {
            downstream.await
        } else {
            upstream.await
        };
        let (up, down) = if upstream_done {
            (first, second)
        } else {
            (second, first)
        };

        let summary = |res: &Result<CopyResult, tokio::task::JoinError>| match res {
            Ok(r) => (r.packets, r.end.to_string()),
            Err(e) => (0, e.to_string()),
        };
        let (up_packets, up_end) = summary(&up);
        let (down_packets, down_end) = summary(&down);
        tracing::debug!(
            connection_id = %id,
            upstream_packets = up_packets,
            upstream_end = %up_end,
            downstream_packets = down_packets,
            downstream_end = %down_end,
            "Tunnel closed"
        );

        if let Some(player) = &player {
            self.hooks.player_leave(player);
        }
    }
}

struct CopyResult {
    packets: u64,
    /// Why the loop stopped.
    end: io::Error,
}

async fn copy_packets(from: Conn, to: Conn) -> CopyResult {
    let mut packets = 0u64;
    let end = loop {
        let packet = match from.read_packet().await {
            Ok(packet) => packet,
            Err(e) => break e,
        };
        if let Err(e) = to.write_packet(&packet).await {
            break e;
        }
        packets += 1;
    };
    CopyResult { packets, end }
}
