//! Bedrock proxy binary.
//!
//! ```text
//! bedrock-proxy [--config <path>] [--check]
//! ```
//!
//! Loads the configuration (writing the default one if the file is
//! missing), initialises logging and metrics, then runs the proxy over
//! RakNet until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use bedrock_proxy::config::load_config;
use bedrock_proxy::hooks::PluginRegistry;
use bedrock_proxy::lifecycle::signals;
use bedrock_proxy::net::raknet::RakNetTransport;
use bedrock_proxy::observability::{logging, metrics};
use bedrock_proxy::{ClaimsParser, Proxy, Shutdown, StartupError};

#[derive(Debug, Parser)]
#[command(name = "bedrock-proxy", version, about = "Domain-based reverse proxy for Minecraft Bedrock Edition")]
struct Cli {
    /// Configuration file; created from the built-in default if missing.
    #[arg(long, env = "BEDROCK_PROXY_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Validate the configuration and routing table, then exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "bedrock-proxy starting"
    );

    let plugins = PluginRegistry::from_names(&config.plugins.enabled)
        .map_err(StartupError::UnknownPlugin)?;
    let proxy = match Proxy::build(
        &config,
        Arc::new(RakNetTransport),
        Arc::new(ClaimsParser),
        plugins,
    ) {
        Ok(proxy) => proxy,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return Err(e.into());
        }
    };

    if cli.check {
        tracing::info!("Configuration OK");
        return Ok(());
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    if let Err(e) = proxy.run(&shutdown).await {
        tracing::error!(error = %e, "Startup failed");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
