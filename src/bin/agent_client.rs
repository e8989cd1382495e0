//! Agent client binary: a separate process from the coordinator that
//! connects out to it and executes assigned tasks.

use agent_mesh_coordinator::client::AgentClient;
use agent_mesh_coordinator::config::AgentConfig;
use clap::Parser;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "agent-client", about = "Agent-mesh task-executing client")]
struct Args {
    /// Path to a .env-style file to load before reading the process environment.
    #[arg(long)]
    env_file: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if let Some(path) = &args.env_file {
        dotenvy::from_path(path).ok();
    }

    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = AgentConfig::load()?;
    tracing::info!(agent_id = %config.agent_id, agent_type = %config.agent_type, "starting agent client");

    let client = AgentClient::new(config);
    let supervisor = tokio::spawn(client.run());

    // Exit 0 on a clean interrupt; the supervising loop itself never
    // returns, so Ctrl+C is the only ordinary shutdown path.
    tokio::select! {
        _ = supervisor => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received interrupt, shutting down");
        }
    }
    Ok(())
}
