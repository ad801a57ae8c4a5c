//! sitepm daemon - per-site app supervisor

use anyhow::{Context, Result};
use sitepm_core::{constants, Settings};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod daemon;
mod handlers;

use daemon::Daemon;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sitepmd=info,sitepm_lifecycle=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("sitepm daemon starting...");

    let settings = Settings::load_default().context("Failed to load settings")?;

    let socket_path = constants::socket_path();
    if socket_path.exists() {
        match tokio::net::UnixStream::connect(&socket_path).await {
            Ok(_) => {
                error!("Daemon is already running");
                std::process::exit(1);
            }
            Err(_) => {
                info!("Removing stale socket file");
                std::fs::remove_file(&socket_path)?;
            }
        }
    }

    let daemon = Daemon::new(settings, &socket_path)
        .await
        .context("Failed to start daemon")?;

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        result = daemon.run() => {
            if let Err(e) = result {
                error!("Daemon error: {}", e);
                daemon.shutdown().await;
                return Err(e.into());
            }
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down...");
        }
    }

    daemon.shutdown().await;
    info!("Daemon shutdown complete");
    Ok(())
}
