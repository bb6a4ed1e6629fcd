//! Conversion of a validated config into runtime descriptors.
//!
//! Every unset per-item field is filled from `defaults` here, once.

use std::time::Duration;

use crate::config::schema::{PingStatusConfig, PingStatusOverrides, ProxyConfig};
use crate::hooks::{EventKind, Webhook, WebhookError};
use crate::net::listener::{GatewayDescriptor, ListenerDescriptor, PingStatus};
use crate::routing::ServerDescriptor;

impl ProxyConfig {
    pub fn gateway_descriptors(&self) -> Vec<GatewayDescriptor> {
        let defaults = &self.defaults.gateway;
        self.gateways
            .iter()
            .map(|(id, gw)| GatewayDescriptor {
                id: id.clone(),
                listeners: gw
                    .listeners
                    .iter()
                    .map(|l| ListenerDescriptor {
                        bind: l.bind.clone(),
                        ping_status: ping_status(
                            &self.defaults.listener.ping_status,
                            &l.ping_status,
                        ),
                    })
                    .collect(),
                server_ids: gw.servers.clone(),
                receive_proxy_protocol: gw
                    .receive_proxy_protocol
                    .unwrap_or(defaults.receive_proxy_protocol),
                compression: gw.compression.unwrap_or(defaults.compression),
                not_found_message: gw
                    .not_found_message
                    .clone()
                    .unwrap_or_else(|| defaults.not_found_message.clone()),
            })
            .collect()
    }

    pub fn server_descriptors(&self) -> Vec<ServerDescriptor> {
        let defaults = &self.defaults.server;
        self.servers
            .iter()
            .map(|(id, srv)| ServerDescriptor {
                id: id.clone(),
                domains: srv.domains.clone(),
                address: srv.address.clone(),
                dial_timeout: Duration::from_millis(
                    srv.dial_timeout_ms.unwrap_or(defaults.dial_timeout_ms),
                ),
                disconnect_message: srv
                    .disconnect_message
                    .clone()
                    .unwrap_or_else(|| defaults.disconnect_message.clone()),
                send_proxy_protocol: srv
                    .send_proxy_protocol
                    .unwrap_or(defaults.send_proxy_protocol),
                webhook_ids: srv.webhooks.clone(),
            })
            .collect()
    }

    /// Build the webhook clients. Unknown event names are skipped; validation
    /// reports them.
    pub fn webhooks(&self) -> Result<Vec<Webhook>, WebhookError> {
        self.webhooks
            .iter()
            .map(|(id, hook)| {
                let events = hook
                    .events
                    .iter()
                    .filter_map(|e| EventKind::from_name(e))
                    .collect();
                let timeout = hook.timeout_ms.unwrap_or(self.defaults.webhook.timeout_ms);
                Webhook::new(id.clone(), hook.url.clone(), events, Duration::from_millis(timeout))
            })
            .collect()
    }
}

fn ping_status(defaults: &PingStatusConfig, overrides: &PingStatusOverrides) -> PingStatus {
    PingStatus {
        edition: overrides.edition.clone().unwrap_or_else(|| defaults.edition.clone()),
        motd: overrides.motd.clone().unwrap_or_else(|| defaults.motd.clone()),
        protocol_version: overrides.protocol_version.unwrap_or(defaults.protocol_version),
        version_name: overrides
            .version_name
            .clone()
            .unwrap_or_else(|| defaults.version_name.clone()),
        player_count: overrides.player_count.unwrap_or(defaults.player_count),
        max_player_count: overrides.max_player_count.unwrap_or(defaults.max_player_count),
        game_mode: overrides
            .game_mode
            .clone()
            .unwrap_or_else(|| defaults.game_mode.clone()),
        game_mode_numeric: overrides
            .game_mode_numeric
            .unwrap_or(defaults.game_mode_numeric),
    }
}

#[cfg(test)]
mod tests {
    use crate::config::loader::parse_config;
    use crate::protocol::Compression;
    use std::time::Duration;

    const CONFIG: &str = r#"
        [defaults.gateway]
        not_found_message = "Unknown host {{domain}}"
        [defaults.listener.ping_status]
        motd = "Default\nSecond"
        max_player_count = 50
        [defaults.server]
        dial_timeout_ms = 250

        [gateways.eu]
        servers = ["lobby"]
        compression = "none"
        [[gateways.eu.listeners]]
        bind = "0.0.0.0:19132"
        ping_status = { motd = "EU" }
        [[gateways.eu.listeners]]
        bind = "0.0.0.0:19133"

        [servers.lobby]
        domains = ["play.example.com"]
        address = "10.0.0.5:19132"
        send_proxy_protocol = true
        webhooks = ["audit"]

        [webhooks.audit]
        url = "http://127.0.0.1:8080/hook"
        events = ["PlayerJoin", "PlayerLeave"]
    "#;

    #[test]
    fn gateway_fields_fall_back_to_defaults() {
        let config = parse_config(CONFIG).unwrap();
        let gateways = config.gateway_descriptors();
        let eu = &gateways[0];
        assert_eq!(eu.id, "eu");
        assert_eq!(eu.compression, Compression::None);
        assert!(!eu.receive_proxy_protocol);
        assert_eq!(eu.not_found_message, "Unknown host {{domain}}");
        assert_eq!(eu.listeners[0].ping_status.motd, "EU");
        assert_eq!(eu.listeners[0].ping_status.max_player_count, 50);
        assert_eq!(eu.listeners[1].ping_status.motd, "Default\nSecond");
    }

    #[test]
    fn server_and_webhook_fields_fall_back_to_defaults() {
        let config = parse_config(CONFIG).unwrap();
        let servers = config.server_descriptors();
        assert_eq!(servers[0].dial_timeout, Duration::from_millis(250));
        assert!(servers[0].send_proxy_protocol);
        assert_eq!(servers[0].webhook_ids, ["audit"]);

        let hooks = config.webhooks().unwrap();
        assert_eq!(hooks[0].id, "audit");
        assert_eq!(hooks[0].events.len(), 2);
    }
}
