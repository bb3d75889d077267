//! Sandgate daemon.
//!
//! Boots the control plane and keeps the development sandbox alive: loads the
//! environment-driven configuration, connects to the container engine, writes
//! the tool manifest for downstream agents, ensures the sandbox container is
//! running, and then parks until a shutdown signal arrives. On shutdown the
//! sandbox is stopped (not removed) so its filesystem survives a restart.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};

use sandgate_core::{ControlConfig, ControlPlane, DockerEngine, METRICS};

#[derive(Parser)]
#[command(name = "sandgated", version, about = "Sandgate sandbox daemon")]
struct Cli {
    /// Enable verbose (debug-level) logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long, env = "SANDGATE_LOG_JSON")]
    json: bool,

    /// Leave the sandbox running on shutdown instead of stopping it
    #[arg(long)]
    keep_running: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    sandgate_core::init_tracing(cli.json, level);

    let config = ControlConfig::from_env();
    info!(
        sandbox = %config.sandbox_name,
        image = %config.sandbox_image,
        api_port = config.api_port,
        "sandgated starting"
    );

    let engine = DockerEngine::connect(config.engine_socket.as_deref())
        .context("Failed to connect to the container engine")?;
    let plane = ControlPlane::bootstrap(config, engine);

    let manifest_path = plane
        .write_manifest()
        .await
        .context("Failed to write the tool manifest")?;
    info!(path = %manifest_path.display(), "tool manifest written");

    let container = plane
        .start_sandbox()
        .await
        .context("Failed to start the sandbox container")?;
    info!(container_id = %container.id, "sandbox ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for the shutdown signal")?;
    info!("shutdown signal received");

    if cli.keep_running {
        info!("leaving the sandbox running");
    } else if let Err(error) = plane.stop_sandbox().await {
        warn!(%error, "sandbox did not stop cleanly");
    }

    METRICS.flush();
    Ok(())
}
