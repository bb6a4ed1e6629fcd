//! Event payloads shared by plugins and webhooks.

use std::fmt;
use std::net::SocketAddr;

use chrono::Utc;
use serde::Serialize;

/// Kinds of player events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    PlayerJoin,
    PlayerLeave,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::PlayerJoin, EventKind::PlayerLeave];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PlayerJoin => "PlayerJoin",
            EventKind::PlayerLeave => "PlayerLeave",
        }
    }

    /// Parse a configured event name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A player attached to a tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub username: String,
    pub remote_address: SocketAddr,
    pub local_address: SocketAddr,
    pub gateway_id: String,
    pub server_id: String,
    pub domain: String,
    pub server_address: String,
}

/// Body posted to webhooks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event<'a> {
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// RFC 3339 timestamp.
    pub occurred_at: String,
    pub data: &'a Player,
}

impl<'a> Event<'a> {
    pub fn new(kind: EventKind, player: &'a Player) -> Self {
        Self {
            kind,
            occurred_at: Utc::now().to_rfc3339(),
            data: player,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_player() -> Player {
    Player {
        username: "Steve".into(),
        remote_address: "10.0.0.9:50000".parse().unwrap(),
        local_address: "127.0.0.1:19132".parse().unwrap(),
        gateway_id: "default".into(),
        server_id: "lobby".into(),
        domain: "play.example.com".into(),
        server_address: "10.1.0.1:19132".into(),
    }
}
