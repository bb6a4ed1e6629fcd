//! Routing index.
//!
//! # Responsibilities
//! - Map `gateway_id@domain` to the server answering it
//! - Reject colliding routes and references to unknown servers
//!
//! # Design Decisions
//! - Built once before traffic starts, immutable afterwards (shared
//!   through `Arc` without locks)
//! - Domains are lower-cased on insert and on lookup

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::net::listener::GatewayDescriptor;

/// Error type for index construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("server id {0} is defined more than once")]
    DuplicateServer(String),

    #[error("gateway {gateway_id} references unknown server {server_id}")]
    UnknownServer {
        gateway_id: String,
        server_id: String,
    },

    #[error("gateway {gateway_id}: domain {domain} is claimed by both {existing} and {conflicting}")]
    DuplicateRoute {
        gateway_id: String,
        domain: String,
        existing: String,
        conflicting: String,
    },
}

/// Immutable description of a backend server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    pub id: String,
    /// Virtual hosts this server answers for.
    pub domains: Vec<String>,
    /// Dial target.
    pub address: String,
    pub dial_timeout: Duration,
    /// Template sent when the backend cannot be reached.
    pub disconnect_message: String,
    /// Write a PROXY v2 header before replaying the handshake.
    pub send_proxy_protocol: bool,
    pub webhook_ids: Vec<String>,
}

/// Lookup table from `(gateway, domain)` to server.
#[derive(Debug, Default)]
pub struct RoutingIndex {
    routes: HashMap<String, Arc<ServerDescriptor>>,
}

impl RoutingIndex {
    /// Build the index for every gateway and each server it permits.
    pub fn build(
        gateways: &[GatewayDescriptor],
        servers: &[ServerDescriptor],
    ) -> Result<Self, IndexError> {
        let mut by_id: HashMap<&str, Arc<ServerDescriptor>> = HashMap::new();
        for server in servers {
            if by_id
                .insert(server.id.as_str(), Arc::new(server.clone()))
                .is_some()
            {
                return Err(IndexError::DuplicateServer(server.id.clone()));
            }
        }

        let mut routes: HashMap<String, Arc<ServerDescriptor>> = HashMap::new();
        for gateway in gateways {
            for server_id in &gateway.server_ids {
                let server = by_id.get(server_id.as_str()).ok_or_else(|| {
                    IndexError::UnknownServer {
                        gateway_id: gateway.id.clone(),
                        server_id: server_id.clone(),
                    }
                })?;

                for domain in &server.domains {
                    let key = Self::key(&gateway.id, domain);
                    if let Some(existing) = routes.get(&key) {
                        // A server listed twice on one gateway is harmless.
                        if existing.id == server.id {
                            continue;
                        }
                        return Err(IndexError::DuplicateRoute {
                            gateway_id: gateway.id.clone(),
                            domain: domain.to_lowercase(),
                            existing: existing.id.clone(),
                            conflicting: server.id.clone(),
                        });
                    }
                    routes.insert(key, Arc::clone(server));
                }
            }
        }

        tracing::debug!(routes = routes.len(), "Routing index built");
        Ok(Self { routes })
    }

    /// Composite lookup key.
    pub fn key(gateway_id: &str, domain: &str) -> String {
        format!("{}@{}", gateway_id, domain.to_lowercase())
    }

    pub fn lookup(&self, gateway_id: &str, domain: &str) -> Option<&Arc<ServerDescriptor>> {
        self.routes.get(&Self::key(gateway_id, domain))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Compression;

    fn gateway(id: &str, servers: &[&str]) -> GatewayDescriptor {
        GatewayDescriptor {
            id: id.into(),
            listeners: Vec::new(),
            server_ids: servers.iter().map(|s| s.to_string()).collect(),
            receive_proxy_protocol: false,
            compression: Compression::Flate,
            not_found_message: String::new(),
        }
    }

    fn server(id: &str, domains: &[&str]) -> ServerDescriptor {
        ServerDescriptor {
            id: id.into(),
            domains: domains.iter().map(|d| d.to_string()).collect(),
            address: "127.0.0.1:19133".into(),
            dial_timeout: Duration::from_secs(1),
            disconnect_message: String::new(),
            send_proxy_protocol: false,
            webhook_ids: Vec::new(),
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let index = RoutingIndex::build(
            &[gateway("default", &["lobby"])],
            &[server("lobby", &["Play.Example.com"])],
        )
        .unwrap();
        assert_eq!(index.lookup("default", "play.example.com").unwrap().id, "lobby");
        assert_eq!(index.lookup("default", "PLAY.EXAMPLE.COM").unwrap().id, "lobby");
        assert!(index.lookup("other", "play.example.com").is_none());
    }

    #[test]
    fn duplicate_domain_on_one_gateway_fails() {
        let err = RoutingIndex::build(
            &[gateway("default", &["a", "b"])],
            &[server("a", &["play.example.com"]), server("b", &["PLAY.example.com"])],
        )
        .unwrap_err();
        assert_eq!(
            err,
            IndexError::DuplicateRoute {
                gateway_id: "default".into(),
                domain: "play.example.com".into(),
                existing: "a".into(),
                conflicting: "b".into(),
            }
        );
    }

    #[test]
    fn same_domain_on_separate_gateways_is_allowed() {
        let index = RoutingIndex::build(
            &[gateway("eu", &["a"]), gateway("us", &["b"])],
            &[server("a", &["play.example.com"]), server("b", &["play.example.com"])],
        )
        .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup("us", "play.example.com").unwrap().id, "b");
    }

    #[test]
    fn unknown_server_reference_fails() {
        let err = RoutingIndex::build(&[gateway("default", &["ghost"])], &[]).unwrap_err();
        assert!(matches!(err, IndexError::UnknownServer { ref server_id, .. } if server_id == "ghost"));
    }

    #[test]
    fn duplicate_server_id_fails() {
        let err = RoutingIndex::build(&[], &[server("a", &["x"]), server("a", &["y"])]).unwrap_err();
        assert_eq!(err, IndexError::DuplicateServer("a".into()));
    }
}
