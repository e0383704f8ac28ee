//! GSA analysis worker - main entry point

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use gsa_common::config::shutdown_signal;
use gsa_common::logging::{init_logging, LogConfig};
use gsa_common::notify::notifier_from_env;
use gsa_common::registry::JobRegistry;
use gsa_worker::config::WorkerConfig;
use gsa_worker::AnalysisWorker;

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::from_env("gsa-worker")?;
    init_logging(&log_config)?;

    info!("Starting GSA analysis worker");

    let config = Arc::new(WorkerConfig::load()?);
    info!(
        release = %config.pathway_release,
        "Configuration loaded"
    );

    let board = config.backend.connect_blackboard().await?;
    let broker = config.backend.connect_broker().await?;
    let registry = JobRegistry::new(board, config.backend.status_ttl);
    let notifier = notifier_from_env();

    let worker = AnalysisWorker::new(broker, registry, config, notifier)?;

    tokio::select! {
        _ = worker.run() => {},
        _ = shutdown_signal() => {
            info!("Worker shutting down");
        }
    }

    Ok(())
}
