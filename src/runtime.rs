use kube::Client;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{config::OperatorConfig, controller::run_controller};

/// Spawn the Kubernetes controller loop.
pub fn spawn_controller(
    client: Client,
    cfg: OperatorConfig,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move { run_controller(client, cfg).await })
}

/// Run the controller until it finishes or a shutdown signal arrives.
pub async fn run(client: Client, cfg: OperatorConfig) -> anyhow::Result<()> {
    let controller = spawn_controller(client, cfg);
    tokio::select! {
        res = controller => res??,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received; exiting");
        }
    }
    Ok(())
}
