//! switchyard: prioritized listener scheduling with master negotiation.
//!
//! # Usage
//!
//! ```bash
//! # Config file in the working directory
//! switchyard
//!
//! # Explicit config and identity
//! switchyard --config /etc/switchyard.toml --service-id node-b --stats-port 9301
//!
//! # Via environment variables (also read from .env)
//! SWITCHYARD_CONFIG=/etc/switchyard.toml SWITCHYARD_SERVICE_ID=node-b switchyard
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;

use switchyard_node::{LoggingHandler, Node, NodeConfig};

/// Prioritized listener scheduling node.
#[derive(Parser, Debug)]
#[command(name = "switchyard", version, about)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "SWITCHYARD_CONFIG", default_value = "switchyard.toml")]
    config: PathBuf,

    /// Override the configured service id.
    #[arg(long, env = "SWITCHYARD_SERVICE_ID")]
    service_id: Option<String>,

    /// Override the stats HTTP port (0 = disabled).
    #[arg(long, env = "SWITCHYARD_STATS_PORT")]
    stats_port: Option<u16>,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = NodeConfig::from_file(&self.config)?;
        if let Some(service_id) = &self.service_id {
            config.service_id = service_id.clone();
        }
        if let Some(port) = self.stats_port {
            config.stats_port = port;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(?cli, "starting switchyard");

    let config = cli.load_config()?;
    let node = Node::build(config, Arc::new(LoggingHandler)).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    node.run(shutdown_rx).await?;

    tracing::info!("switchyard exited cleanly");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl_c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
