use agent_mesh_coordinator::config::CoordinatorConfig;
use agent_mesh_coordinator::coordinator::Coordinator;
use agent_mesh_coordinator::dashboard;
use agent_mesh_coordinator::persistence::InMemoryTaskRepository;
use std::process::ExitCode;
use tracing::{error, info, Level};

const MAX_COMPLETED_RECORDS: usize = 10_000;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
    info!("starting agent-mesh coordinator");

    let config = match CoordinatorConfig::load() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "configuration error");
            return ExitCode::FAILURE;
        }
    };

    let repository = InMemoryTaskRepository::new(MAX_COMPLETED_RECORDS);
    let (coordinator, notify_rx) = Coordinator::new(config.clone(), repository);

    let dashboard_task = tokio::spawn(dashboard::http::run(
        coordinator.dashboard.clone(),
        config.dashboard_host.clone(),
        config.dashboard_port,
    ));

    tokio::select! {
        result = coordinator.run(notify_rx) => {
            if let Err(err) = result {
                error!(error = %err, "coordinator exited");
                return ExitCode::FAILURE;
            }
        }
        joined = dashboard_task => {
            match joined {
                Ok(Err(err)) => {
                    error!(error = %err, "dashboard server exited");
                    return ExitCode::FAILURE;
                }
                Err(join_err) => {
                    error!(error = %join_err, "dashboard task panicked");
                    return ExitCode::FAILURE;
                }
                Ok(Ok(())) => {}
            }
        }
    }

    ExitCode::SUCCESS
}
