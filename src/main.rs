use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use geopulse::config::{
    DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_PORT, DEFAULT_TICK_INTERVAL_SECS,
};
use geopulse::{GatewayConfig, GatewayServer};

/// Live location presence gateway.
#[derive(Debug, Parser)]
#[command(name = "geopulse", version)]
struct Cli {
    /// Interface to listen on
    #[arg(long, env = "GEOPULSE_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Listen port
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Close connections with no inbound traffic for this many seconds
    #[arg(long, env = "GEOPULSE_IDLE_TIMEOUT_SECS", default_value_t = DEFAULT_IDLE_TIMEOUT_SECS)]
    idle_timeout_secs: u64,

    /// Keepalive ping cadence in seconds
    #[arg(long, env = "GEOPULSE_TICK_INTERVAL_SECS", default_value_t = DEFAULT_TICK_INTERVAL_SECS)]
    tick_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("geopulse=info,warn"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = GatewayConfig {
        host: cli.host,
        port: cli.port,
        idle_timeout: Duration::from_secs(cli.idle_timeout_secs),
        tick_interval: Duration::from_secs(cli.tick_interval_secs),
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    GatewayServer::new(config)
        .run_until(listener, shutdown_signal())
        .await
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            signal_result = tokio::signal::ctrl_c() => {
                if let Err(err) = signal_result {
                    info!("failed to listen for Ctrl+C: {}", err);
                } else {
                    info!("received Ctrl+C");
                }
            }
            _ = terminate.recv() => {
                info!("received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            info!("failed to listen for Ctrl+C: {}", err);
        } else {
            info!("received Ctrl+C");
        }
    }
}
