//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.
//! Per-item fields left unset fall back to the `defaults` section.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::protocol::Compression;

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Connection processor pool.
    pub processing: ProcessingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Built-in plugins to enable.
    pub plugins: PluginsConfig,

    /// Values applied to gateways, listeners, servers and webhooks that
    /// leave a field unset.
    pub defaults: DefaultsConfig,

    /// Gateways keyed by id.
    pub gateways: BTreeMap<String, GatewayConfig>,

    /// Backend servers keyed by id.
    pub servers: BTreeMap<String, ServerConfig>,

    /// Webhooks keyed by id.
    pub webhooks: BTreeMap<String, WebhookConfig>,
}

/// Connection processor settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of concurrent handshake workers.
    pub workers: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub enabled: Vec<String>,
}

/// Fallback values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub gateway: GatewayDefaults,
    pub listener: ListenerDefaults,
    pub server: ServerDefaults,
    pub webhook: WebhookDefaults,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayDefaults {
    pub receive_proxy_protocol: bool,
    pub compression: Compression,
    /// Template sent when no server answers the requested domain.
    pub not_found_message: String,
}

impl Default for GatewayDefaults {
    fn default() -> Self {
        Self {
            receive_proxy_protocol: false,
            compression: Compression::Flate,
            not_found_message: crate::routing::DEFAULT_NOT_FOUND_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerDefaults {
    pub ping_status: PingStatusConfig,
}

/// Discovery ping answer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PingStatusConfig {
    pub edition: String,
    /// Up to two lines separated by a newline.
    pub motd: String,
    pub protocol_version: i32,
    pub version_name: String,
    pub player_count: u32,
    pub max_player_count: u32,
    pub game_mode: String,
    pub game_mode_numeric: u32,
}

impl Default for PingStatusConfig {
    fn default() -> Self {
        Self {
            edition: "MCPE".to_string(),
            motd: "Bedrock Proxy\nJoin us".to_string(),
            protocol_version: 527,
            version_name: "1.19.1".to_string(),
            player_count: 0,
            max_player_count: 10,
            game_mode: "Survival".to_string(),
            game_mode_numeric: 1,
        }
    }
}

/// Per-listener ping fields; unset ones come from the defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PingStatusOverrides {
    pub edition: Option<String>,
    pub motd: Option<String>,
    pub protocol_version: Option<i32>,
    pub version_name: Option<String>,
    pub player_count: Option<u32>,
    pub max_player_count: Option<u32>,
    pub game_mode: Option<String>,
    pub game_mode_numeric: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerDefaults {
    /// Backend dial timeout in milliseconds.
    pub dial_timeout_ms: u64,
    /// Template sent when the backend cannot be reached.
    pub disconnect_message: String,
    pub send_proxy_protocol: bool,
}

impl Default for ServerDefaults {
    fn default() -> Self {
        Self {
            dial_timeout_ms: 1_000,
            disconnect_message: "Sorry {{username}}, {{domain}} is offline.".to_string(),
            send_proxy_protocol: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookDefaults {
    /// HTTP client timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for WebhookDefaults {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

/// A gateway and its listeners.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub listeners: Vec<ListenerConfig>,

    /// Ids of the servers this gateway may route to.
    pub servers: Vec<String>,

    pub receive_proxy_protocol: Option<bool>,
    pub compression: Option<Compression>,
    pub not_found_message: Option<String>,
}

/// One bound endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:19132").
    pub bind: String,
    pub ping_status: PingStatusOverrides,
}

/// A backend server.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Domains this server answers for (case-insensitive).
    pub domains: Vec<String>,

    /// Backend address (e.g., "10.0.0.5:19132").
    pub address: String,

    pub dial_timeout_ms: Option<u64>,
    pub disconnect_message: Option<String>,
    pub send_proxy_protocol: Option<bool>,

    /// Ids of the webhooks notified about this server's players.
    pub webhooks: Vec<String>,
}

/// An HTTP endpoint notified of player events.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: String,
    /// Event names, e.g. `PlayerJoin`, `PlayerLeave`.
    pub events: Vec<String>,
    pub timeout_ms: Option<u64>,
}
