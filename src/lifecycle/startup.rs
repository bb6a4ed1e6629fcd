//! Startup orchestration.
//!
//! # Responsibilities
//! - Convert the validated configuration into descriptors
//! - Build the routing index and hook dispatcher (fatal on error)
//! - Bind every gateway before any stage starts accepting traffic
//! - Wire the pipeline channels and run all stages
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Stages are connected by unbounded channels, one per hop
//! - When every accept loop has exited the remaining stages are stopped

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::ProxyConfig;
use crate::hooks::{HookDispatcher, HookError, PluginRegistry, WebhookError};
use crate::lifecycle::Shutdown;
use crate::net::connection::TunnelTracker;
use crate::net::listener::{BoundGateway, Gateway, GatewayError};
use crate::net::transport::Transport;
use crate::processing::ConnProcessor;
use crate::protocol::LoginParser;
use crate::routing::{IndexError, RoutingIndex, ServerRouter};
use crate::tunnel::TunnelPool;

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid routing table: {0}")]
    Index(#[from] IndexError),

    #[error("invalid hooks: {0}")]
    Hooks(#[from] HookError),

    #[error("failed to build webhook client: {0}")]
    Webhook(#[from] WebhookError),

    #[error("unknown plugin {0:?}")]
    UnknownPlugin(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// A fully built proxy, ready to bind.
pub struct Proxy {
    gateways: Vec<Gateway>,
    processor: ConnProcessor,
    workers: usize,
    router: Arc<ServerRouter>,
    pool: TunnelPool,
    hooks: Arc<HookDispatcher>,
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("gateways", &self.gateways)
            .field("workers", &self.workers)
            .field("router", &self.router)
            .finish()
    }
}

impl Proxy {
    /// Build every stage from a validated configuration.
    ///
    /// `plugins` are loaded here; the ones that fail to load are skipped.
    pub fn build(
        config: &ProxyConfig,
        transport: Arc<dyn Transport>,
        parser: Arc<dyn LoginParser>,
        plugins: PluginRegistry,
    ) -> Result<Self, StartupError> {
        let gateways = config.gateway_descriptors();
        let servers = config.server_descriptors();

        let index = RoutingIndex::build(&gateways, &servers)?;
        tracing::info!(
            gateways = gateways.len(),
            servers = servers.len(),
            routes = index.len(),
            "Routing index built"
        );

        let hooks = Arc::new(HookDispatcher::new(
            plugins.load(),
            config.webhooks()?,
            &servers,
        )?);

        let router = Arc::new(ServerRouter::new(
            Arc::new(index),
            &gateways,
            Arc::clone(&transport),
            Arc::clone(&hooks),
        ));

        Ok(Self {
            gateways: gateways
                .into_iter()
                .map(|g| Gateway::new(g, Arc::clone(&transport)))
                .collect(),
            processor: ConnProcessor::new(parser),
            workers: config.processing.workers,
            router,
            pool: TunnelPool::new(TunnelTracker::new(), Arc::clone(&hooks)),
            hooks,
        })
    }

    /// Bind every gateway. Nothing is accepted until [`BoundProxy::serve`].
    pub async fn bind(self) -> Result<BoundProxy, StartupError> {
        let mut bound = Vec::with_capacity(self.gateways.len());
        for gateway in &self.gateways {
            bound.push(gateway.bind().await?);
        }
        Ok(BoundProxy {
            gateways: bound,
            processor: self.processor,
            workers: self.workers,
            router: self.router,
            pool: self.pool,
            hooks: self.hooks,
        })
    }

    /// Bind and serve until every accept loop has exited.
    pub async fn run(self, shutdown: &Shutdown) -> Result<(), StartupError> {
        self.bind().await?.serve(shutdown).await;
        Ok(())
    }
}

/// A proxy whose gateways are bound.
pub struct BoundProxy {
    gateways: Vec<BoundGateway>,
    processor: ConnProcessor,
    workers: usize,
    router: Arc<ServerRouter>,
    pool: TunnelPool,
    hooks: Arc<HookDispatcher>,
}

impl BoundProxy {
    /// Addresses of every bound listener.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.gateways.iter().flat_map(|g| g.local_addrs()).collect()
    }

    pub fn tracker(&self) -> TunnelTracker {
        self.pool.tracker().clone()
    }

    /// Run all stages until the accept loops exit.
    pub async fn serve(self, shutdown: &Shutdown) {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (processed_tx, processed_rx) = mpsc::unbounded_channel();
        let (tunnel_tx, tunnel_rx) = mpsc::unbounded_channel();

        let workers = self.processor.spawn_workers(
            self.workers,
            raw_rx,
            processed_tx,
            &shutdown.subscribe(),
        );
        let router = tokio::spawn(Arc::clone(&self.router).run(
            processed_rx,
            tunnel_tx,
            shutdown.subscribe(),
        ));
        let pool = {
            let pool = self.pool.clone();
            let shutdown = shutdown.subscribe();
            tokio::spawn(async move { pool.run(tunnel_rx, shutdown).await })
        };

        let mut accept_loops = JoinSet::new();
        for gateway in self.gateways {
            accept_loops.spawn(gateway.serve(raw_tx.clone(), shutdown.subscribe()));
        }
        drop(raw_tx);
        // Subscribers created after the trigger never see it.
        if shutdown.is_triggered() {
            accept_loops.abort_all();
        } else {
            tracing::info!(workers = self.workers, "Proxy ready");
        }

        while let Some(res) = accept_loops.join_next().await {
            if let Err(e) = res {
                if e.is_panic() {
                    tracing::error!(error = %e, "Gateway task panicked");
                }
            }
        }

        // Handshakes still waiting on a silent client are abandoned.
        shutdown.trigger();
        drop(workers);
        for (stage, handle) in [("router", router), ("tunnel pool", pool)] {
            if let Err(e) = handle.await {
                tracing::error!(stage, error = %e, "Stage task panicked");
            }
        }

        self.hooks.plugins().unload();
        tracing::info!(
            active_tunnels = self.pool.tracker().active_count(),
            "Proxy stopped"
        );
    }
}
