//! Sandgate - sandbox control plane CLI
//!
//! The `sandgate` command drives the sandbox lifecycle and the tool
//! dispatcher from a terminal, against the same engine the daemon uses.
//!
//! ## Commands
//!
//! - `status`: Show where the sandbox currently is
//! - `start` / `stop` / `remove`: Lifecycle transitions
//! - `checkpoint` / `restore` / `checkpoints`: Filesystem snapshots
//! - `login`: Issue a bearer token for the streaming channel
//! - `tools` / `call`: Inspect and invoke registered tools
//! - `install-tool-server` / `tool-servers` / `remove-tool-server`:
//!   Manage MCP tool servers inside the sandbox
//! - `manifest`: Write the tool manifest document

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, Level};

use sandgate_core::{ControlConfig, ControlPlane, DockerEngine, ToolCall};

#[derive(Parser)]
#[command(name = "sandgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sandbox control plane for AI coding agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show sandbox status
    Status,

    /// Create the sandbox container if needed and start it
    Start,

    /// Stop the sandbox container
    Stop,

    /// Remove the sandbox container
    Remove,

    /// Snapshot the sandbox filesystem under a label
    Checkpoint {
        /// Checkpoint label; reusing a label replaces the earlier checkpoint
        label: String,
    },

    /// Replace the sandbox with one restored from a checkpoint
    Restore {
        /// Label of the checkpoint to restore
        label: String,
    },

    /// List checkpoints, oldest first
    Checkpoints,

    /// Exchange the shared secret for a bearer token
    Login {
        /// Subject the credential is issued to
        #[arg(short, long, default_value = "dev")]
        subject: String,

        /// Shared secret (default: the configured SANDGATE_SECRET)
        #[arg(long)]
        secret: Option<String>,
    },

    /// List the registered tools
    Tools,

    /// Invoke a tool by name
    Call {
        /// Registered tool name
        name: String,

        /// Tool arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        arguments: String,
    },

    /// Clone and install an MCP tool server into the running sandbox
    InstallToolServer {
        /// Name to register the server under
        name: String,

        /// Git repository URL (must be on the fetch allow-list)
        url: String,
    },

    /// List installed tool servers
    ToolServers,

    /// Forget an installed tool server
    RemoveToolServer {
        /// Name the server was registered under
        name: String,
    },

    /// Write the tool manifest to its configured path
    Manifest,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    sandgate_core::init_tracing(cli.json, level);

    let config = ControlConfig::from_env();
    let engine = DockerEngine::connect(config.engine_socket.as_deref())
        .context("Failed to connect to the container engine")?;
    let plane = ControlPlane::bootstrap(config, engine);

    match cli.command {
        Commands::Status => cmd_status(&plane).await,
        Commands::Start => cmd_start(&plane).await,
        Commands::Stop => cmd_stop(&plane).await,
        Commands::Remove => cmd_remove(&plane).await,
        Commands::Checkpoint { label } => cmd_checkpoint(&plane, &label).await,
        Commands::Restore { label } => cmd_restore(&plane, &label).await,
        Commands::Checkpoints => cmd_checkpoints(&plane).await,
        Commands::Login { subject, secret } => cmd_login(&plane, &subject, secret.as_deref()),
        Commands::Tools => cmd_tools(&plane),
        Commands::Call { name, arguments } => cmd_call(&plane, &name, &arguments).await,
        Commands::InstallToolServer { name, url } => {
            cmd_install_tool_server(&plane, &name, &url).await
        }
        Commands::ToolServers => cmd_tool_servers(&plane).await,
        Commands::RemoveToolServer { name } => cmd_remove_tool_server(&plane, &name).await,
        Commands::Manifest => cmd_manifest(&plane).await,
    }
}

async fn cmd_status(plane: &ControlPlane<DockerEngine>) -> Result<()> {
    let report = plane.status().await?;

    println!("version:   {}", report.version);
    println!("sandbox:   {}", report.sandbox);
    println!("status:    {}", report.status);
    match report.container_id {
        Some(id) => println!("container: {id}"),
        None => println!("container: -"),
    }
    println!("checkpoints: {}", report.checkpoints);
    println!("tools:       {}", report.tools);
    println!("sessions:    {}", report.active_sessions);
    Ok(())
}

async fn cmd_start(plane: &ControlPlane<DockerEngine>) -> Result<()> {
    let container = plane.start_sandbox().await?;
    println!("sandbox running: {}", container.id);
    Ok(())
}

async fn cmd_stop(plane: &ControlPlane<DockerEngine>) -> Result<()> {
    let status = plane.stop_sandbox().await?;
    println!("sandbox {status}");
    Ok(())
}

async fn cmd_remove(plane: &ControlPlane<DockerEngine>) -> Result<()> {
    plane.remove_sandbox().await?;
    println!("sandbox removed");
    Ok(())
}

async fn cmd_checkpoint(plane: &ControlPlane<DockerEngine>, label: &str) -> Result<()> {
    let checkpoint = plane.checkpoint(label).await?;
    info!(image_id = %checkpoint.id, "checkpoint committed");
    println!("checkpoint {}: {}", checkpoint.label, checkpoint.id);
    Ok(())
}

async fn cmd_restore(plane: &ControlPlane<DockerEngine>, label: &str) -> Result<()> {
    let container = plane.restore(label).await?;
    println!("restored {label} into {}", container.id);
    Ok(())
}

async fn cmd_checkpoints(plane: &ControlPlane<DockerEngine>) -> Result<()> {
    let checkpoints = plane.list_checkpoints().await?;
    if checkpoints.is_empty() {
        println!("no checkpoints");
        return Ok(());
    }
    for checkpoint in checkpoints {
        println!(
            "{}  {}  {}",
            checkpoint.created_at.format("%Y-%m-%d %H:%M:%S"),
            checkpoint.label,
            checkpoint.id
        );
    }
    Ok(())
}

fn cmd_login(
    plane: &ControlPlane<DockerEngine>,
    subject: &str,
    secret: Option<&str>,
) -> Result<()> {
    let secret = match secret {
        Some(secret) => secret.to_string(),
        None => plane.config().credential_secret.clone(),
    };
    let token = plane.login(subject, &secret)?;
    println!("{token}");
    Ok(())
}

fn cmd_tools(plane: &ControlPlane<DockerEngine>) -> Result<()> {
    for spec in plane.tools() {
        println!("{:<18} {}", spec.name, spec.description);
    }
    Ok(())
}

async fn cmd_call(plane: &ControlPlane<DockerEngine>, name: &str, arguments: &str) -> Result<()> {
    let arguments: Value =
        serde_json::from_str(arguments).context("Arguments must be a JSON object")?;

    let result = plane.call_tool(ToolCall::new(name, arguments)).await;
    if result.success {
        let payload = result.payload.unwrap_or(Value::Null);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        Ok(())
    } else {
        bail!(
            "{name} failed: {}",
            result.error_message.unwrap_or_else(|| "unknown error".into())
        );
    }
}

async fn cmd_install_tool_server(
    plane: &ControlPlane<DockerEngine>,
    name: &str,
    url: &str,
) -> Result<()> {
    let record = plane.install_tool_server(name, url).await?;
    println!("installed {} from {}", record.name, record.url);
    Ok(())
}

async fn cmd_tool_servers(plane: &ControlPlane<DockerEngine>) -> Result<()> {
    let servers = plane.list_tool_servers().await;
    if servers.is_empty() {
        println!("no tool servers installed");
        return Ok(());
    }
    for server in servers {
        println!(
            "{}  {}  {}",
            server.installed_at.format("%Y-%m-%d %H:%M:%S"),
            server.name,
            server.url
        );
    }
    Ok(())
}

async fn cmd_remove_tool_server(plane: &ControlPlane<DockerEngine>, name: &str) -> Result<()> {
    plane.remove_tool_server(name).await?;
    println!("removed {name}");
    Ok(())
}

async fn cmd_manifest(plane: &ControlPlane<DockerEngine>) -> Result<()> {
    let path = plane.write_manifest().await?;
    println!("wrote {}", path.display());
    Ok(())
}
