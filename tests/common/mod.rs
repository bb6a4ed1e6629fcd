//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::json;
use tokio::task::JoinHandle;

use bedrock_proxy::config::parse_config;
use bedrock_proxy::hooks::PluginRegistry;
use bedrock_proxy::net::connection::TunnelTracker;
use bedrock_proxy::net::{Connection, MemoryConnection, MemoryTransport};
use bedrock_proxy::protocol::packet::{self, Disconnect, Login};
use bedrock_proxy::protocol::{batch, Compression, PacketWriter};
use bedrock_proxy::{ClaimsParser, Proxy, Shutdown};

pub const BACKEND_ADDR: &str = "10.1.0.1:19132";

/// A proxy running on the in-process transport.
pub struct TestProxy {
    pub transport: MemoryTransport,
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub tracker: TunnelTracker,
    pub handle: JoinHandle<()>,
}

impl TestProxy {
    /// Open a client session to the gateway.
    pub fn connect(&self) -> Arc<MemoryConnection> {
        self.transport.connect(self.addr).unwrap()
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), self.handle)
            .await
            .expect("proxy should stop after shutdown")
            .unwrap();
    }
}

/// A single-gateway config routing `domains` to [`BACKEND_ADDR`].
pub fn config_toml(domains: &[&str], extra_server: &str) -> String {
    format!(
        r#"
        [processing]
        workers = 2

        [gateways.default]
        servers = ["survival"]
        not_found_message = "{{{{domain}}}} is not served here"
        [[gateways.default.listeners]]
        bind = "127.0.0.1:0"

        [servers.survival]
        domains = {domains:?}
        address = "{BACKEND_ADDR}"
        dial_timeout_ms = 200
        disconnect_message = "{{{{serverAddress}}}} is offline"
        {extra_server}
        "#
    )
}

pub async fn start_proxy(toml: &str, plugins: PluginRegistry) -> TestProxy {
    start_proxy_on(MemoryTransport::new(), toml, plugins).await
}

pub async fn start_proxy_on(
    transport: MemoryTransport,
    toml: &str,
    plugins: PluginRegistry,
) -> TestProxy {
    let config = parse_config(toml).unwrap();
    let proxy = Proxy::build(
        &config,
        Arc::new(transport.clone()),
        Arc::new(ClaimsParser),
        plugins,
    )
    .unwrap();
    let bound = proxy.bind().await.unwrap();
    let addr = bound.local_addrs()[0];
    let tracker = bound.tracker();

    let shutdown = Shutdown::new();
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { bound.serve(&shutdown).await })
    };

    TestProxy {
        transport,
        addr,
        shutdown,
        tracker,
        handle,
    }
}

fn jwt(claims: serde_json::Value) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"ES384"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

/// First datagram of a client joining `server_address` as `username`.
pub fn login_datagram(username: &str, server_address: &str) -> Vec<u8> {
    let chain = json!({
        "chain": [jwt(json!({ "extraData": { "displayName": username } }))]
    })
    .to_string();
    let token = jwt(json!({ "ServerAddress": server_address }));

    let mut request = PacketWriter::new();
    request.le_u32(chain.len() as u32);
    request.raw(chain.as_bytes());
    request.le_u32(token.len() as u32);
    request.raw(token.as_bytes());

    let login = Login {
        client_protocol: 527,
        connection_request: request.into_inner(),
    };
    batch::encode(&[packet::marshal(&login)], Compression::Flate).unwrap()
}

/// Read the next datagram and decode it as a disconnect.
pub async fn read_disconnect(conn: &MemoryConnection) -> Disconnect {
    let datagram = tokio::time::timeout(Duration::from_secs(2), conn.read_packet())
        .await
        .expect("disconnect should arrive")
        .unwrap();
    let packets = batch::decode(&datagram, Compression::Flate).unwrap();
    packet::unmarshal(&packets[0]).unwrap()
}

/// Wait until `cond` holds or fail after two seconds.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
